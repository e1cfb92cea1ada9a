//! Labelled grid handler (`grid` records)
//!
//! A grid is a set of named dimensions with coordinate arrays along them and
//! data variables spanning some of them.
//!
//! Modes:
//!
//! - `gridz`: one zstd-packed side file (`.gridz`) holding a JSON index
//!   followed by every array in the `bin` layout
//! - `dir`: a side directory (`.grid`) with `index.json` and one `.bin` file
//!   per array; needs a store with local files

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use icer_codec::{
    new_side_file_name, HandlerMetadata, HandlerProvider, HandlerRecord, SideFileStore,
    TypeHandler,
};
use icer_format::checksum::{compute_crc32c, verify_crc32c};
use icer_format::{IceError, Record, Result, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::array::{decode_bin, encode_bin, NdArray};
use super::{read_checked, unknown_mode, write_checked, ByteReader};

/// Record type name handled here
pub const GRID_TYPE: &str = "grid";

const VARIABLE_TYPE: &str = "variable";
const INDEX_FILE: &str = "index.json";
const ZSTD_LEVEL: i32 = 3;

/// A data variable spanning named dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Dimension names, in axis order
    pub dims: Vec<String>,
    /// Values; shape matches the dimension sizes
    pub data: NdArray,
}

impl Variable {
    /// Create a variable
    pub fn new<S: Into<String>>(dims: impl IntoIterator<Item = S>, data: NdArray) -> Self {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
            data,
        }
    }

    fn to_record(&self) -> Record {
        let dims: Vec<Value> = self.dims.iter().map(|d| Value::from(d.as_str())).collect();
        Record::new(VARIABLE_TYPE)
            .with("dims", Value::Seq(dims))
            .with("data", self.data.to_record())
    }

    fn from_value(value: &Value) -> Result<Self> {
        let record = value
            .as_record()
            .ok_or_else(|| IceError::invalid_record("grid variable is not a record"))?;
        record.expect_type(VARIABLE_TYPE)?;
        Ok(Self {
            dims: strings(record.field("dims")?, "variable dims")?,
            data: NdArray::from_value(record.field("data")?)?,
        })
    }
}

/// Named dimensions, coordinates along them and variables over them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grid {
    /// Dimension names
    pub dims: Vec<String>,
    /// Size of each dimension
    pub shape: Vec<usize>,
    /// One-dimensional coordinate arrays, keyed by dimension name
    pub coords: BTreeMap<String, NdArray>,
    /// Data variables
    pub vars: BTreeMap<String, Variable>,
    /// Free-form attributes
    pub attrs: BTreeMap<String, String>,
}

impl Grid {
    /// Empty grid over `dims`
    pub fn new<S: Into<String>>(dims: impl IntoIterator<Item = (S, usize)>) -> Self {
        let (dims, shape) = dims.into_iter().map(|(d, n)| (d.into(), n)).unzip();
        Self {
            dims,
            shape,
            ..Self::default()
        }
    }

    /// Add a coordinate along dimension `dim`
    pub fn with_coord(mut self, dim: impl Into<String>, values: NdArray) -> Self {
        self.coords.insert(dim.into(), values);
        self
    }

    /// Add a variable
    pub fn with_var(mut self, name: impl Into<String>, var: Variable) -> Self {
        self.vars.insert(name.into(), var);
        self
    }

    /// Add an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Size of dimension `dim`
    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .map(|i| self.shape[i])
    }

    /// Check that coordinates and variables agree with the dimensions
    pub fn validate(&self) -> Result<()> {
        if self.dims.len() != self.shape.len() {
            return Err(IceError::invalid_record("grid dims and shape differ in length"));
        }
        for (i, dim) in self.dims.iter().enumerate() {
            if self.dims[..i].contains(dim) {
                return Err(IceError::invalid_record(format!("duplicate grid dimension '{}'", dim)));
            }
        }
        for (dim, coord) in &self.coords {
            let size = self.dim_size(dim).ok_or_else(|| {
                IceError::invalid_record(format!("coordinate '{}' names no dimension", dim))
            })?;
            if coord.shape.as_slice() != [size].as_slice() {
                return Err(IceError::invalid_record(format!(
                    "coordinate '{}' has shape {:?}, expected [{}]",
                    dim, coord.shape, size
                )));
            }
        }
        for (name, var) in &self.vars {
            let expected = var
                .dims
                .iter()
                .map(|d| {
                    self.dim_size(d).ok_or_else(|| {
                        IceError::invalid_record(format!(
                            "variable '{}' uses unknown dimension '{}'",
                            name, d
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if var.data.shape.as_slice() != expected.as_slice() {
                return Err(IceError::invalid_record(format!(
                    "variable '{}' has shape {:?}, expected {:?}",
                    name, var.data.shape, expected
                )));
            }
        }
        Ok(())
    }

    /// Record form
    pub fn to_record(&self) -> Record {
        let dims: Vec<Value> = self.dims.iter().map(|d| Value::from(d.as_str())).collect();
        let shape: Vec<Value> = self.shape.iter().map(|n| Value::Int(*n as i64)).collect();
        let coords: BTreeMap<String, Value> = self
            .coords
            .iter()
            .map(|(k, v)| (k.clone(), Value::Record(v.to_record())))
            .collect();
        let vars: BTreeMap<String, Value> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), Value::Record(v.to_record())))
            .collect();
        Record::new(GRID_TYPE)
            .with("dims", Value::Seq(dims))
            .with("shape", Value::Seq(shape))
            .with("coords", coords)
            .with("vars", vars)
            .with("attrs", self.attrs.clone())
    }

    /// Read a grid back from its record form
    pub fn from_record(record: &Record) -> Result<Self> {
        record.expect_type(GRID_TYPE)?;
        let shape = record
            .field("shape")?
            .as_seq()
            .ok_or_else(|| IceError::invalid_record("grid shape is not a sequence"))?
            .iter()
            .map(|n| {
                n.as_i64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| IceError::invalid_record("grid dimension is not a size"))
            })
            .collect::<Result<_>>()?;
        let grid = Self {
            dims: strings(record.field("dims")?, "grid dims")?,
            shape,
            coords: map_field(record, "coords")?
                .iter()
                .map(|(k, v)| Ok((k.clone(), NdArray::from_value(v)?)))
                .collect::<Result<_>>()?,
            vars: map_field(record, "vars")?
                .iter()
                .map(|(k, v)| Ok((k.clone(), Variable::from_value(v)?)))
                .collect::<Result<_>>()?,
            attrs: map_field(record, "attrs")?
                .iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|s| (k.clone(), s.to_string()))
                        .ok_or_else(|| IceError::invalid_record("grid attribute is not a string"))
                })
                .collect::<Result<_>>()?,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Read a grid back from a value holding its record form
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.as_record() {
            Some(record) => Self::from_record(record),
            None => Err(IceError::invalid_record(format!(
                "expected grid record, found {}",
                value.kind()
            ))),
        }
    }
}

impl From<Grid> for Value {
    fn from(grid: Grid) -> Self {
        Value::Record(grid.to_record())
    }
}

fn map_field<'a>(record: &'a Record, key: &str) -> Result<&'a BTreeMap<String, Value>> {
    record
        .field(key)?
        .as_map()
        .ok_or_else(|| IceError::invalid_record(format!("grid {} is not a map", key)))
}

fn strings(value: &Value, what: &str) -> Result<Vec<String>> {
    value
        .as_seq()
        .ok_or_else(|| IceError::invalid_record(format!("{} is not a sequence", what)))?
        .iter()
        .map(|s| {
            s.as_str()
                .map(str::to_string)
                .ok_or_else(|| IceError::invalid_record(format!("{} holds a non-string", what)))
        })
        .collect()
}

/// Representation written by the grid handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridMode {
    /// Single zstd-packed file
    #[default]
    Gridz,
    /// Side directory of plain files
    Dir,
}

impl GridMode {
    const NAMES: [&'static str; 2] = ["gridz", "dir"];

    /// Mode name stored in records
    pub fn as_str(self) -> &'static str {
        match self {
            GridMode::Gridz => "gridz",
            GridMode::Dir => "dir",
        }
    }
}

impl fmt::Display for GridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GridMode {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gridz" => Ok(GridMode::Gridz),
            "dir" => Ok(GridMode::Dir),
            other => Err(unknown_mode(GRID_TYPE, other, &Self::NAMES)),
        }
    }
}

/// Configures the grid handler
#[derive(Debug, Clone, Copy, Default)]
pub struct GridProvider {
    mode: GridMode,
}

impl GridProvider {
    /// Provider writing `mode`
    pub fn new(mode: GridMode) -> Self {
        Self { mode }
    }
}

impl HandlerProvider for GridProvider {
    fn type_name(&self) -> &str {
        GRID_TYPE
    }

    fn mode(&self) -> &str {
        self.mode.as_str()
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            type_name: GRID_TYPE.to_string(),
            mode: self.mode.as_str().to_string(),
            description: "Labelled grids of coordinates and variables".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn bind(&self, store: Arc<dyn SideFileStore>) -> Result<Box<dyn TypeHandler>> {
        if self.mode == GridMode::Dir && !store.kind().has_local_files() {
            return Err(IceError::HandlerConfig {
                handler: GRID_TYPE.to_string(),
                mode: self.mode.as_str().to_string(),
                reason: format!("needs local files, store is {}", store.kind()),
            });
        }
        Ok(Box::new(GridHandler {
            mode: self.mode,
            store,
        }))
    }
}

/// Where one array sits in a packed or directory grid
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayEntry {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dims: Option<Vec<String>>,
    /// Byte offset into the packed arrays (`gridz`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    /// File inside the side directory (`dir`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    len: u64,
    crc32c: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GridIndex {
    dims: Vec<String>,
    shape: Vec<usize>,
    attrs: BTreeMap<String, String>,
    coords: Vec<ArrayEntry>,
    vars: Vec<ArrayEntry>,
}

impl GridIndex {
    fn describe(grid: &Grid) -> Self {
        Self {
            dims: grid.dims.clone(),
            shape: grid.shape.clone(),
            attrs: grid.attrs.clone(),
            coords: Vec::new(),
            vars: Vec::new(),
        }
    }

    /// Arrays of `grid` in index order, each with its variable dims
    fn arrays(grid: &Grid) -> impl Iterator<Item = (&str, Option<&[String]>, &NdArray)> {
        let coords = grid.coords.iter().map(|(k, v)| (k.as_str(), None, v));
        let vars = grid
            .vars
            .iter()
            .map(|(k, v)| (k.as_str(), Some(v.dims.as_slice()), &v.data));
        coords.chain(vars)
    }

    fn push(&mut self, entry: ArrayEntry) {
        if entry.dims.is_some() {
            self.vars.push(entry);
        } else {
            self.coords.push(entry);
        }
    }

    /// Rebuild the grid, loading each array with `load`
    fn assemble(self, mut load: impl FnMut(&ArrayEntry) -> Result<NdArray>) -> Result<Grid> {
        let mut grid = Grid {
            dims: self.dims,
            shape: self.shape,
            attrs: self.attrs,
            ..Grid::default()
        };
        for entry in &self.coords {
            grid.coords.insert(entry.name.clone(), load(entry)?);
        }
        for entry in &self.vars {
            let dims = entry.dims.clone().unwrap_or_default();
            grid.vars
                .insert(entry.name.clone(), Variable::new(dims, load(entry)?));
        }
        grid.validate()?;
        Ok(grid)
    }
}

struct GridHandler {
    mode: GridMode,
    store: Arc<dyn SideFileStore>,
}

impl TypeHandler for GridHandler {
    fn type_name(&self) -> &str {
        GRID_TYPE
    }

    fn mode(&self) -> &str {
        self.mode.as_str()
    }

    fn flatten(&self, value: &Record, record: &mut HandlerRecord) -> Result<()> {
        let grid = Grid::from_record(value)?;
        record.insert_serialized("dims", &grid.dims)?;
        record.insert_serialized("shape", &grid.shape)?;
        record.insert_serialized("vars", &grid.vars.keys().collect::<Vec<_>>())?;

        match self.mode {
            GridMode::Gridz => {
                let packed = zstd::encode_all(encode_gridz(&grid)?.as_slice(), ZSTD_LEVEL)?;
                write_checked(self.store.as_ref(), record, new_side_file_name("gridz"), &packed)
            }
            GridMode::Dir => {
                let name = new_side_file_name("grid");
                write_grid_dir(self.store.as_ref(), &name, &grid)?;
                record.attach_side_file(name);
                Ok(())
            }
        }
    }

    fn restore(&self, record: &HandlerRecord) -> Result<Value> {
        let grid = match record.mode().parse::<GridMode>()? {
            GridMode::Gridz => {
                let packed = read_checked(self.store.as_ref(), record)?;
                decode_gridz(&zstd::decode_all(packed.as_slice())?)?
            }
            GridMode::Dir => read_grid_dir(self.store.as_ref(), record.side_file()?)?,
        };
        Ok(grid.into())
    }
}

fn encode_gridz(grid: &Grid) -> Result<Vec<u8>> {
    let mut index = GridIndex::describe(grid);
    let mut blob = Vec::new();
    for (name, dims, array) in GridIndex::arrays(grid) {
        let bin = encode_bin(array);
        index.push(ArrayEntry {
            name: name.to_string(),
            dims: dims.map(<[String]>::to_vec),
            offset: Some(blob.len() as u64),
            file: None,
            len: bin.len() as u64,
            crc32c: compute_crc32c(&bin),
        });
        blob.extend_from_slice(&bin);
    }

    let index_json = serde_json::to_vec(&index)?;
    let mut out = Vec::with_capacity(4 + index_json.len() + blob.len());
    out.extend_from_slice(&(index_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&index_json);
    out.extend_from_slice(&blob);
    Ok(out)
}

fn decode_gridz(bytes: &[u8]) -> Result<Grid> {
    let mut reader = ByteReader::new(bytes, "grid");
    let index_len = reader.u32()? as usize;
    let index: GridIndex = serde_json::from_slice(reader.take(index_len)?)?;
    let blob = reader.take(reader.remaining())?;

    index.assemble(|entry| {
        let start = entry
            .offset
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| IceError::invalid_record(format!("grid array '{}' has no offset", entry.name)))?;
        let end = usize::try_from(entry.len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|end| *end <= blob.len())
            .ok_or_else(|| IceError::invalid_record(format!("grid array '{}' is truncated", entry.name)))?;
        let bin = &blob[start..end];
        verify_crc32c(&entry.name, bin, entry.crc32c)?;
        decode_bin(bin)
    })
}

fn local_dir(store: &dyn SideFileStore, name: &str) -> Result<PathBuf> {
    store.local_path(name).ok_or_else(|| IceError::HandlerConfig {
        handler: GRID_TYPE.to_string(),
        mode: GridMode::Dir.as_str().to_string(),
        reason: format!("store has no local path for '{}'", name),
    })
}

/// Write the grid into a hidden partial directory, then rename it into place
fn write_grid_dir(store: &dyn SideFileStore, name: &str, grid: &Grid) -> Result<()> {
    if !store.is_writable() {
        return Err(IceError::read_only(format!("write '{}'", name)));
    }
    let target = local_dir(store, name)?;
    let partial = target.with_file_name(format!(".{}.partial", name));
    if partial.exists() {
        fs::remove_dir_all(&partial)?;
    }
    fs::create_dir(&partial)?;

    let written = fill_grid_dir(&partial, grid).and_then(|()| Ok(fs::rename(&partial, &target)?));
    if written.is_err() {
        let _ = fs::remove_dir_all(&partial);
    }
    written?;
    debug!(side_dir = %name, arrays = grid.coords.len() + grid.vars.len(), "wrote grid directory");
    Ok(())
}

fn fill_grid_dir(dir: &Path, grid: &Grid) -> Result<()> {
    let mut index = GridIndex::describe(grid);
    for (i, (name, dims, array)) in GridIndex::arrays(grid).enumerate() {
        let bin = encode_bin(array);
        let file = format!("array_{}.bin", i);
        fs::write(dir.join(&file), &bin)?;
        index.push(ArrayEntry {
            name: name.to_string(),
            dims: dims.map(<[String]>::to_vec),
            offset: None,
            file: Some(file),
            len: bin.len() as u64,
            crc32c: compute_crc32c(&bin),
        });
    }
    fs::write(dir.join(INDEX_FILE), serde_json::to_vec_pretty(&index)?)?;
    Ok(())
}

fn read_grid_dir(store: &dyn SideFileStore, name: &str) -> Result<Grid> {
    let dir = local_dir(store, name)?;
    if !dir.is_dir() {
        return Err(IceError::SideFileNotFound {
            name: name.to_string(),
        });
    }
    let index: GridIndex = serde_json::from_slice(&fs::read(dir.join(INDEX_FILE))?)?;
    index.assemble(|entry| {
        let file = entry
            .file
            .as_deref()
            .ok_or_else(|| IceError::invalid_record(format!("grid array '{}' has no file", entry.name)))?;
        icer_format::validate_name(file)?;
        let bin = fs::read(dir.join(file))?;
        verify_crc32c(&entry.name, &bin, entry.crc32c)?;
        decode_bin(&bin)
    })
}
