//! Column table handler (`table` records)
//!
//! Modes:
//!
//! - `csv`: header row plus one text row per table row (`.csv`); column
//!   dtypes live in the record
//! - `cols`: binary columnar layout packed with zstd (`.cols`); numeric
//!   columns reuse the array `bin` layout

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use icer_codec::{
    new_side_file_name, HandlerMetadata, HandlerProvider, HandlerRecord, SideFileStore,
    TypeHandler,
};
use icer_format::{IceError, Record, Result, Value};
use serde::{Deserialize, Serialize};

use super::array::{decode_bin, encode_bin, ArrayData, NdArray};
use super::{read_checked, unknown_mode, write_checked, ByteReader};

/// Record type name handled here
pub const TABLE_TYPE: &str = "table";

const COLS_MAGIC: &[u8; 7] = b"ICETBL\x01";
const ZSTD_LEVEL: i32 = 3;

/// Column storage
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// 64-bit floats
    F64(Vec<f64>),
    /// 64-bit signed integers
    I64(Vec<i64>),
    /// Booleans
    Bool(Vec<bool>),
    /// Strings
    Str(Vec<String>),
}

impl ColumnData {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            ColumnData::F64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    /// Whether the column has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// dtype name stored in records
    pub fn dtype(&self) -> &'static str {
        match self {
            ColumnData::F64(_) => "f64",
            ColumnData::I64(_) => "i64",
            ColumnData::Bool(_) => "bool",
            ColumnData::Str(_) => "str",
        }
    }

    fn dtype_byte(&self) -> u8 {
        match self {
            ColumnData::F64(_) => 0,
            ColumnData::I64(_) => 1,
            ColumnData::Bool(_) => 2,
            ColumnData::Str(_) => 3,
        }
    }

    fn cell(&self, row: usize) -> String {
        match self {
            ColumnData::F64(v) => v[row].to_string(),
            ColumnData::I64(v) => v[row].to_string(),
            ColumnData::Bool(v) => v[row].to_string(),
            ColumnData::Str(v) => v[row].clone(),
        }
    }

    fn to_values(&self) -> Vec<Value> {
        match self {
            ColumnData::F64(v) => v.iter().map(|x| Value::Float(*x)).collect(),
            ColumnData::I64(v) => v.iter().map(|x| Value::Int(*x)).collect(),
            ColumnData::Bool(v) => v.iter().map(|x| Value::Bool(*x)).collect(),
            ColumnData::Str(v) => v.iter().map(|x| Value::Str(x.clone())).collect(),
        }
    }

    fn from_values(dtype: &str, items: &[Value]) -> Result<Self> {
        fn collect<T>(items: &[Value], get: impl Fn(&Value) -> Option<T>, dtype: &str) -> Result<Vec<T>> {
            items
                .iter()
                .map(|v| {
                    get(v).ok_or_else(|| {
                        IceError::invalid_record(format!("table cell {} is not {}", v.kind(), dtype))
                    })
                })
                .collect()
        }
        match dtype {
            "f64" => Ok(ColumnData::F64(collect(items, Value::as_f64, dtype)?)),
            "i64" => Ok(ColumnData::I64(collect(items, Value::as_i64, dtype)?)),
            "bool" => Ok(ColumnData::Bool(collect(items, Value::as_bool, dtype)?)),
            "str" => Ok(ColumnData::Str(collect(
                items,
                |v| v.as_str().map(str::to_string),
                dtype,
            )?)),
            other => Err(unknown_dtype(other)),
        }
    }
}

fn unknown_dtype(dtype: &str) -> IceError {
    IceError::invalid_record(format!("unknown table dtype '{}'", dtype))
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Cells
    pub data: ColumnData,
}

impl Column {
    /// Create a column
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Columns of equal length with unique names
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking column lengths and names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut names = BTreeSet::new();
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(IceError::invalid_record(format!(
                    "duplicate table column '{}'",
                    column.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            let rows = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != rows) {
                return Err(IceError::invalid_record(format!(
                    "column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.data.len(),
                    rows
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Columns in order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Record form
    pub fn to_record(&self) -> Record {
        let columns: Vec<Value> = self
            .columns
            .iter()
            .map(|c| {
                vec![
                    ("name", Value::from(c.name.as_str())),
                    ("dtype", Value::from(c.data.dtype())),
                    ("data", Value::Seq(c.data.to_values())),
                ]
                .into_iter()
                .collect()
            })
            .collect();
        Record::new(TABLE_TYPE).with("columns", Value::Seq(columns))
    }

    /// Read a table back from its record form
    pub fn from_record(record: &Record) -> Result<Self> {
        record.expect_type(TABLE_TYPE)?;
        let items = record
            .field("columns")?
            .as_seq()
            .ok_or_else(|| IceError::invalid_record("table columns are not a sequence"))?;
        let mut columns = Vec::with_capacity(items.len());
        for item in items {
            let text = |key: &str| -> Result<String> {
                item.get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| IceError::invalid_record(format!("table column has no '{}'", key)))
            };
            let name = text("name")?;
            let dtype = text("dtype")?;
            let cells = item
                .get("data")
                .and_then(Value::as_seq)
                .ok_or_else(|| IceError::invalid_record("table column has no data"))?;
            columns.push(Column::new(name, ColumnData::from_values(&dtype, cells)?));
        }
        Self::new(columns)
    }

    /// Read a table back from a value holding its record form
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.as_record() {
            Some(record) => Self::from_record(record),
            None => Err(IceError::invalid_record(format!(
                "expected table record, found {}",
                value.kind()
            ))),
        }
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Value::Record(table.to_record())
    }
}

/// Representation written by the table handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableMode {
    /// Row-oriented text
    #[default]
    Csv,
    /// Binary columnar, zstd packed
    Cols,
}

impl TableMode {
    const NAMES: [&'static str; 2] = ["csv", "cols"];

    /// Mode name stored in records
    pub fn as_str(self) -> &'static str {
        match self {
            TableMode::Csv => "csv",
            TableMode::Cols => "cols",
        }
    }
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableMode {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(TableMode::Csv),
            "cols" => Ok(TableMode::Cols),
            other => Err(unknown_mode(TABLE_TYPE, other, &Self::NAMES)),
        }
    }
}

/// Configures the table handler
#[derive(Debug, Clone, Copy, Default)]
pub struct TableProvider {
    mode: TableMode,
}

impl TableProvider {
    /// Provider writing `mode`
    pub fn new(mode: TableMode) -> Self {
        Self { mode }
    }
}

impl HandlerProvider for TableProvider {
    fn type_name(&self) -> &str {
        TABLE_TYPE
    }

    fn mode(&self) -> &str {
        self.mode.as_str()
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            type_name: TABLE_TYPE.to_string(),
            mode: self.mode.as_str().to_string(),
            description: "Named-column tables".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn bind(&self, store: Arc<dyn SideFileStore>) -> Result<Box<dyn TypeHandler>> {
        Ok(Box::new(TableHandler {
            mode: self.mode,
            store,
        }))
    }
}

struct TableHandler {
    mode: TableMode,
    store: Arc<dyn SideFileStore>,
}

impl TypeHandler for TableHandler {
    fn type_name(&self) -> &str {
        TABLE_TYPE
    }

    fn mode(&self) -> &str {
        self.mode.as_str()
    }

    fn flatten(&self, value: &Record, record: &mut HandlerRecord) -> Result<()> {
        let table = Table::from_record(value)?;
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        let dtypes: Vec<&str> = table.columns.iter().map(|c| c.data.dtype()).collect();
        record.insert_serialized("shape", &[table.num_rows(), table.num_columns()])?;
        record.insert_serialized("columns", &names)?;
        record.insert_serialized("dtypes", &dtypes)?;

        let store = self.store.as_ref();
        match self.mode {
            TableMode::Csv => {
                let text = encode_csv(&table);
                write_checked(store, record, new_side_file_name("csv"), text.as_bytes())
            }
            TableMode::Cols => {
                let packed = zstd::encode_all(encode_cols(&table).as_slice(), ZSTD_LEVEL)?;
                write_checked(store, record, new_side_file_name("cols"), &packed)
            }
        }
    }

    fn restore(&self, record: &HandlerRecord) -> Result<Value> {
        let table = match record.mode().parse::<TableMode>()? {
            TableMode::Csv => {
                let shape: [usize; 2] = record.field("shape")?;
                let names: Vec<String> = record.field("columns")?;
                let dtypes: Vec<String> = record.field("dtypes")?;
                let bytes = read_checked(self.store.as_ref(), record)?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| IceError::invalid_record(format!("table csv is not UTF-8: {}", e)))?;
                decode_csv(&text, shape[0], &names, &dtypes)?
            }
            TableMode::Cols => {
                let packed = read_checked(self.store.as_ref(), record)?;
                decode_cols(&zstd::decode_all(packed.as_slice())?)?
            }
        };
        Ok(table.into())
    }
}

fn quote_csv(field: &str, out: &mut String) {
    let needs_quotes = field.is_empty()
        || field.contains([',', '"', '\n', '\r'])
        || field.starts_with(' ')
        || field.ends_with(' ');
    if needs_quotes {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

fn encode_csv(table: &Table) -> String {
    let mut out = String::new();
    if table.columns.is_empty() {
        return out;
    }
    let write_row = |cells: &mut dyn Iterator<Item = String>, out: &mut String| {
        for (i, cell) in cells.enumerate() {
            if i > 0 {
                out.push(',');
            }
            quote_csv(&cell, out);
        }
        out.push('\n');
    };
    write_row(&mut table.columns.iter().map(|c| c.name.clone()), &mut out);
    for row in 0..table.num_rows() {
        write_row(&mut table.columns.iter().map(|c| c.data.cell(row)), &mut out);
    }
    out
}

/// Split CSV text into rows of fields. Every row, including the last, ends
/// with a newline; quoted fields may span lines.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        pending = true;
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                pending = false;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(IceError::invalid_record("unterminated quoted csv field"));
    }
    if pending {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

fn decode_csv(text: &str, rows: usize, names: &[String], dtypes: &[String]) -> Result<Table> {
    if names.len() != dtypes.len() {
        return Err(IceError::invalid_record("table columns and dtypes differ in length"));
    }
    if names.is_empty() {
        return Table::new(Vec::new());
    }

    let parsed = parse_csv(text)?;
    let (header, body) = parsed
        .split_first()
        .ok_or_else(|| IceError::invalid_record("table csv has no header"))?;
    if header != names {
        return Err(IceError::invalid_record("table csv header does not match the record"));
    }
    if body.len() != rows {
        return Err(IceError::invalid_record(format!(
            "table csv has {} rows, expected {}",
            body.len(),
            rows
        )));
    }
    if let Some(bad) = body.iter().position(|r| r.len() != names.len()) {
        return Err(IceError::invalid_record(format!(
            "table csv row {} has {} fields, expected {}",
            bad + 1,
            body[bad].len(),
            names.len()
        )));
    }

    let mut columns = Vec::with_capacity(names.len());
    for (i, (name, dtype)) in names.iter().zip(dtypes).enumerate() {
        let cells = body.iter().map(|r| r[i].as_str());
        let bad_cell = |cell: &str| IceError::invalid_record(format!("bad {} cell '{}' in column '{}'", dtype, cell, name));
        let data = match dtype.as_str() {
            "f64" => ColumnData::F64(
                cells
                    .map(|c| c.parse::<f64>().map_err(|_| bad_cell(c)))
                    .collect::<Result<_>>()?,
            ),
            "i64" => ColumnData::I64(
                cells
                    .map(|c| c.parse::<i64>().map_err(|_| bad_cell(c)))
                    .collect::<Result<_>>()?,
            ),
            "bool" => ColumnData::Bool(
                cells
                    .map(|c| c.parse::<bool>().map_err(|_| bad_cell(c)))
                    .collect::<Result<_>>()?,
            ),
            "str" => ColumnData::Str(cells.map(str::to_string).collect()),
            other => return Err(unknown_dtype(other)),
        };
        columns.push(Column::new(name.clone(), data));
    }
    Table::new(columns)
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn encode_cols(table: &Table) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(COLS_MAGIC);
    out.extend_from_slice(&(table.columns.len() as u32).to_le_bytes());
    out.extend_from_slice(&(table.num_rows() as u64).to_le_bytes());
    for column in &table.columns {
        push_bytes(&mut out, column.name.as_bytes());
        out.push(column.data.dtype_byte());
        let payload = match &column.data {
            ColumnData::F64(v) => encode_bin(&NdArray::vector(v.clone())),
            ColumnData::I64(v) => encode_bin(&NdArray {
                shape: smallvec::smallvec![v.len()],
                data: ArrayData::I64(v.clone()),
            }),
            ColumnData::Bool(v) => v.iter().map(|b| u8::from(*b)).collect(),
            ColumnData::Str(v) => {
                let mut buf = Vec::new();
                for s in v {
                    push_bytes(&mut buf, s.as_bytes());
                }
                buf
            }
        };
        push_bytes(&mut out, &payload);
    }
    out
}

fn decode_cols(bytes: &[u8]) -> Result<Table> {
    let mut reader = ByteReader::new(bytes, "table");
    if reader.take(COLS_MAGIC.len())? != COLS_MAGIC {
        return Err(IceError::invalid_record("table payload has a bad magic"));
    }
    let ncols = reader.u32()? as usize;
    let rows = reader.len_u64()?;
    let mut columns = Vec::with_capacity(ncols.min(1024));
    for _ in 0..ncols {
        let name_len = reader.len_u64()?;
        let name = String::from_utf8(reader.take(name_len)?.to_vec())
            .map_err(|_| IceError::invalid_record("table column name is not UTF-8"))?;
        let dtype = reader.u8()?;
        let payload_len = reader.len_u64()?;
        let payload = reader.take(payload_len)?;
        let data = match dtype {
            0 | 1 => match decode_bin(payload)?.data {
                ArrayData::F64(v) if dtype == 0 => ColumnData::F64(v),
                ArrayData::I64(v) if dtype == 1 => ColumnData::I64(v),
                _ => return Err(IceError::invalid_record("table column dtype mismatch")),
            },
            2 => ColumnData::Bool(payload.iter().map(|b| *b != 0).collect()),
            3 => {
                let mut cells = ByteReader::new(payload, "table column");
                let mut out = Vec::with_capacity(rows.min(1 << 16));
                while cells.remaining() > 0 {
                    let len = cells.len_u64()?;
                    let cell = String::from_utf8(cells.take(len)?.to_vec())
                        .map_err(|_| IceError::invalid_record("table cell is not UTF-8"))?;
                    out.push(cell);
                }
                ColumnData::Str(out)
            }
            other => return Err(unknown_dtype(&format!("#{}", other))),
        };
        if data.len() != rows {
            return Err(IceError::invalid_record(format!(
                "table column '{}' has {} rows, expected {}",
                name,
                data.len(),
                rows
            )));
        }
        columns.push(Column::new(name, data));
    }
    reader.finish()?;
    Table::new(columns)
}
