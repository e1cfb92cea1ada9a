//! N-dimensional array handler (`ndarray` records)
//!
//! Modes:
//!
//! - `json`: data inline in the record, no side file
//! - `txt`: raveled values, one per line (`.txt`)
//! - `bin`: self-describing little-endian binary (`.bin`)
//! - `zst`: the `bin` payload packed with zstd (`.zst`)
//!
//! `bin` layout: magic `ICEARR\x01`, dtype byte (0 = f64, 1 = i64), ndim as
//! u32, each dim as u64, then the raveled values.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use icer_codec::{
    new_side_file_name, HandlerMetadata, HandlerProvider, HandlerRecord, SideFileStore,
    TypeHandler,
};
use icer_format::{IceError, Record, Result, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use smallvec::SmallVec;

use super::{read_checked, unknown_mode, write_checked, ByteReader};

/// Record type name handled here
pub const ARRAY_TYPE: &str = "ndarray";

const MAGIC: &[u8; 7] = b"ICEARR\x01";
const ZSTD_LEVEL: i32 = 3;

/// Array element storage
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// 64-bit floats
    F64(Vec<f64>),
    /// 64-bit signed integers
    I64(Vec<i64>),
}

impl ArrayData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F64(v) => v.len(),
            ArrayData::I64(v) => v.len(),
        }
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// dtype name stored in records
    pub fn dtype(&self) -> &'static str {
        match self {
            ArrayData::F64(_) => "f64",
            ArrayData::I64(_) => "i64",
        }
    }
}

/// A dense row-major n-dimensional array
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    /// Size of each dimension
    pub shape: SmallVec<[usize; 4]>,
    /// Raveled elements
    pub data: ArrayData,
}

impl NdArray {
    /// Build an array, checking that `shape` matches the element count
    pub fn new(shape: &[usize], data: ArrayData) -> Result<Self> {
        let expected = element_count(shape)?;
        if expected != data.len() {
            return Err(IceError::invalid_record(format!(
                "shape {:?} needs {} elements, found {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            shape: SmallVec::from_slice(shape),
            data,
        })
    }

    /// Float array
    pub fn from_f64(shape: &[usize], data: Vec<f64>) -> Result<Self> {
        Self::new(shape, ArrayData::F64(data))
    }

    /// Integer array
    pub fn from_i64(shape: &[usize], data: Vec<i64>) -> Result<Self> {
        Self::new(shape, ArrayData::I64(data))
    }

    /// One-dimensional float array
    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: SmallVec::from_slice(&[data.len()]),
            data: ArrayData::F64(data),
        }
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether there are no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// dtype name
    pub fn dtype(&self) -> &'static str {
        self.data.dtype()
    }

    /// Read an array back from its record form
    pub fn from_record(record: &Record) -> Result<Self> {
        record.expect_type(ARRAY_TYPE)?;
        let shape = shape_from_value(record.field("shape")?)?;
        let dtype = record
            .field("dtype")?
            .as_str()
            .ok_or_else(|| IceError::invalid_record("ndarray dtype is not a string"))?;
        let items = record
            .field("data")?
            .as_seq()
            .ok_or_else(|| IceError::invalid_record("ndarray data is not a sequence"))?;
        let data = match dtype {
            "f64" => ArrayData::F64(
                items
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .ok_or_else(|| IceError::invalid_record("ndarray element is not a number"))
                    })
                    .collect::<Result<_>>()?,
            ),
            "i64" => ArrayData::I64(
                items
                    .iter()
                    .map(|v| {
                        v.as_i64()
                            .ok_or_else(|| IceError::invalid_record("ndarray element is not an integer"))
                    })
                    .collect::<Result<_>>()?,
            ),
            other => return Err(unknown_dtype(other)),
        };
        Self::new(&shape, data)
    }

    /// Read an array back from a value holding its record form
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.as_record() {
            Some(record) => Self::from_record(record),
            None => Err(IceError::invalid_record(format!(
                "expected ndarray record, found {}",
                value.kind()
            ))),
        }
    }

    /// Record form
    pub fn to_record(&self) -> Record {
        let shape: Vec<Value> = self.shape.iter().map(|d| Value::Int(*d as i64)).collect();
        let data: Vec<Value> = match &self.data {
            ArrayData::F64(v) => v.iter().map(|x| Value::Float(*x)).collect(),
            ArrayData::I64(v) => v.iter().map(|x| Value::Int(*x)).collect(),
        };
        Record::new(ARRAY_TYPE)
            .with("shape", Value::Seq(shape))
            .with("dtype", self.dtype())
            .with("data", Value::Seq(data))
    }
}

impl From<NdArray> for Value {
    fn from(array: NdArray) -> Self {
        Value::Record(array.to_record())
    }
}

fn element_count(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, d| {
        acc.checked_mul(*d)
            .ok_or_else(|| IceError::LimitExceeded(format!("shape {:?} overflows", shape)))
    })
}

fn shape_from_value(value: &Value) -> Result<Vec<usize>> {
    value
        .as_seq()
        .ok_or_else(|| IceError::invalid_record("ndarray shape is not a sequence"))?
        .iter()
        .map(|d| {
            d.as_i64()
                .and_then(|d| usize::try_from(d).ok())
                .ok_or_else(|| IceError::invalid_record("ndarray dimension is not a size"))
        })
        .collect()
}

fn unknown_dtype(dtype: &str) -> IceError {
    IceError::invalid_record(format!("unknown ndarray dtype '{}'", dtype))
}

/// Representation written by the array handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMode {
    /// Inline JSON
    Json,
    /// Text, one value per line
    Txt,
    /// Little-endian binary
    #[default]
    Bin,
    /// zstd-packed binary
    Zst,
}

impl ArrayMode {
    const NAMES: [&'static str; 4] = ["json", "txt", "bin", "zst"];

    /// Mode name stored in records
    pub fn as_str(self) -> &'static str {
        match self {
            ArrayMode::Json => "json",
            ArrayMode::Txt => "txt",
            ArrayMode::Bin => "bin",
            ArrayMode::Zst => "zst",
        }
    }
}

impl fmt::Display for ArrayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArrayMode {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ArrayMode::Json),
            "txt" => Ok(ArrayMode::Txt),
            "bin" => Ok(ArrayMode::Bin),
            "zst" => Ok(ArrayMode::Zst),
            other => Err(unknown_mode(ARRAY_TYPE, other, &Self::NAMES)),
        }
    }
}

/// Configures the array handler
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayProvider {
    mode: ArrayMode,
}

impl ArrayProvider {
    /// Provider writing `mode`
    pub fn new(mode: ArrayMode) -> Self {
        Self { mode }
    }
}

impl HandlerProvider for ArrayProvider {
    fn type_name(&self) -> &str {
        ARRAY_TYPE
    }

    fn mode(&self) -> &str {
        self.mode.as_str()
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            type_name: ARRAY_TYPE.to_string(),
            mode: self.mode.as_str().to_string(),
            description: "N-dimensional f64/i64 arrays".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn bind(&self, store: Arc<dyn SideFileStore>) -> Result<Box<dyn TypeHandler>> {
        Ok(Box::new(ArrayHandler {
            mode: self.mode,
            store,
        }))
    }
}

struct ArrayHandler {
    mode: ArrayMode,
    store: Arc<dyn SideFileStore>,
}

impl TypeHandler for ArrayHandler {
    fn type_name(&self) -> &str {
        ARRAY_TYPE
    }

    fn mode(&self) -> &str {
        self.mode.as_str()
    }

    fn flatten(&self, value: &Record, record: &mut HandlerRecord) -> Result<()> {
        let array = NdArray::from_record(value)?;
        record.insert("dtype", array.dtype());
        record.insert_serialized("shape", array.shape.as_slice())?;

        match self.mode {
            ArrayMode::Json => record.insert("data", data_to_json(&array.data)),
            ArrayMode::Txt => {
                let text = encode_txt(&array.data);
                write_checked(self.store.as_ref(), record, new_side_file_name("txt"), text.as_bytes())?;
            }
            ArrayMode::Bin => {
                let bin = encode_bin(&array);
                write_checked(self.store.as_ref(), record, new_side_file_name("bin"), &bin)?;
            }
            ArrayMode::Zst => {
                let packed = zstd::encode_all(encode_bin(&array).as_slice(), ZSTD_LEVEL)?;
                write_checked(self.store.as_ref(), record, new_side_file_name("zst"), &packed)?;
            }
        }
        Ok(())
    }

    fn restore(&self, record: &HandlerRecord) -> Result<Value> {
        let array = match record.mode().parse::<ArrayMode>()? {
            ArrayMode::Json => {
                let shape: Vec<usize> = record.field("shape")?;
                let dtype: String = record.field("dtype")?;
                let items: Vec<JsonValue> = record.field("data")?;
                NdArray::new(&shape, data_from_json(&dtype, &items)?)?
            }
            ArrayMode::Txt => {
                let shape: Vec<usize> = record.field("shape")?;
                let dtype: String = record.field("dtype")?;
                let bytes = read_checked(self.store.as_ref(), record)?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| IceError::invalid_record(format!("ndarray text is not UTF-8: {}", e)))?;
                NdArray::new(&shape, decode_txt(&dtype, &text)?)?
            }
            ArrayMode::Bin => decode_bin(&read_checked(self.store.as_ref(), record)?)?,
            ArrayMode::Zst => {
                let packed = read_checked(self.store.as_ref(), record)?;
                decode_bin(&zstd::decode_all(packed.as_slice())?)?
            }
        };
        Ok(array.into())
    }
}

fn float_to_json(x: f64) -> JsonValue {
    match serde_json::Number::from_f64(x) {
        Some(n) => JsonValue::Number(n),
        None if x.is_nan() => JsonValue::from("nan"),
        None if x > 0.0 => JsonValue::from("inf"),
        None => JsonValue::from("-inf"),
    }
}

fn float_from_json(value: &JsonValue) -> Result<f64> {
    match value {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| IceError::invalid_record("ndarray element out of range")),
        JsonValue::String(s) => match s.as_str() {
            "nan" => Ok(f64::NAN),
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            other => Err(IceError::invalid_record(format!("bad ndarray element '{}'", other))),
        },
        _ => Err(IceError::invalid_record("ndarray element is not a number")),
    }
}

fn data_to_json(data: &ArrayData) -> JsonValue {
    match data {
        ArrayData::F64(v) => JsonValue::Array(v.iter().map(|x| float_to_json(*x)).collect()),
        ArrayData::I64(v) => JsonValue::Array(v.iter().map(|x| JsonValue::from(*x)).collect()),
    }
}

fn data_from_json(dtype: &str, items: &[JsonValue]) -> Result<ArrayData> {
    match dtype {
        "f64" => Ok(ArrayData::F64(
            items.iter().map(float_from_json).collect::<Result<_>>()?,
        )),
        "i64" => Ok(ArrayData::I64(
            items
                .iter()
                .map(|v| {
                    v.as_i64()
                        .ok_or_else(|| IceError::invalid_record("ndarray element is not an integer"))
                })
                .collect::<Result<_>>()?,
        )),
        other => Err(unknown_dtype(other)),
    }
}

fn encode_txt(data: &ArrayData) -> String {
    let mut out = String::new();
    match data {
        ArrayData::F64(v) => {
            for x in v {
                out.push_str(&x.to_string());
                out.push('\n');
            }
        }
        ArrayData::I64(v) => {
            for x in v {
                out.push_str(&x.to_string());
                out.push('\n');
            }
        }
    }
    out
}

fn decode_txt(dtype: &str, text: &str) -> Result<ArrayData> {
    let lines = text.lines().filter(|l| !l.trim().is_empty());
    match dtype {
        "f64" => Ok(ArrayData::F64(
            lines
                .map(|l| {
                    l.trim()
                        .parse::<f64>()
                        .map_err(|e| IceError::invalid_record(format!("bad float '{}': {}", l, e)))
                })
                .collect::<Result<_>>()?,
        )),
        "i64" => Ok(ArrayData::I64(
            lines
                .map(|l| {
                    l.trim()
                        .parse::<i64>()
                        .map_err(|e| IceError::invalid_record(format!("bad integer '{}': {}", l, e)))
                })
                .collect::<Result<_>>()?,
        )),
        other => Err(unknown_dtype(other)),
    }
}

/// Encode an array in the self-describing `bin` layout
pub(crate) fn encode_bin(array: &NdArray) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + 5 + array.ndim() * 8 + array.len() * 8);
    out.extend_from_slice(MAGIC);
    match &array.data {
        ArrayData::F64(_) => out.push(0),
        ArrayData::I64(_) => out.push(1),
    }
    out.extend_from_slice(&(array.ndim() as u32).to_le_bytes());
    for d in &array.shape {
        out.extend_from_slice(&(*d as u64).to_le_bytes());
    }
    match &array.data {
        ArrayData::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        ArrayData::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
    }
    out
}

/// Decode the `bin` layout
pub(crate) fn decode_bin(bytes: &[u8]) -> Result<NdArray> {
    let mut reader = ByteReader::new(bytes, "ndarray");
    if reader.take(MAGIC.len())? != MAGIC {
        return Err(IceError::invalid_record("ndarray payload has a bad magic"));
    }
    let dtype = reader.u8()?;
    let ndim = reader.u32()? as usize;
    if ndim > reader.remaining() / 8 {
        return Err(IceError::invalid_record("truncated ndarray payload"));
    }
    let mut shape = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        shape.push(reader.len_u64()?);
    }
    let count = element_count(&shape)?;
    let byte_len = count
        .checked_mul(8)
        .ok_or_else(|| IceError::LimitExceeded("ndarray payload overflows".to_string()))?;
    let raw = reader.take(byte_len)?;
    reader.finish()?;

    let chunks = raw.chunks_exact(8).map(|c| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(c);
        buf
    });
    let data = match dtype {
        0 => ArrayData::F64(chunks.map(f64::from_le_bytes).collect()),
        1 => ArrayData::I64(chunks.map(i64::from_le_bytes).collect()),
        other => return Err(unknown_dtype(&format!("#{}", other))),
    };
    NdArray::new(&shape, data)
}
