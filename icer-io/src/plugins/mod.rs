//! Built-in handler plugins
//!
//! Three record types ship with icer, each with several representations:
//!
//! | type      | modes                      |
//! |-----------|----------------------------|
//! | `ndarray` | `json`, `txt`, `bin`, `zst` |
//! | `table`   | `csv`, `cols`              |
//! | `grid`    | `gridz`, `dir`             |
//!
//! Side-file payloads carry a CRC32C in their record, verified on restore.

use std::sync::Arc;

use icer_codec::{HandlerRecord, HandlerRegistry, SideFileStore};
use icer_format::checksum::{compute_crc32c, verify_crc32c};
use icer_format::constants::FIELD_CRC32C;
use icer_format::{IceError, Result};
use serde::{Deserialize, Serialize};

pub mod array;
pub mod grid;
pub mod table;

pub use array::{ArrayData, ArrayMode, ArrayProvider, NdArray, ARRAY_TYPE};
pub use grid::{Grid, GridMode, GridProvider, Variable, GRID_TYPE};
pub use table::{Column, ColumnData, Table, TableMode, TableProvider, TABLE_TYPE};

/// Modes for the built-in handlers; `None` leaves a handler out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuiltinModes {
    /// Array handler mode
    pub array: Option<ArrayMode>,
    /// Table handler mode
    pub table: Option<TableMode>,
    /// Grid handler mode
    pub grid: Option<GridMode>,
}

impl Default for BuiltinModes {
    fn default() -> Self {
        Self {
            array: Some(ArrayMode::default()),
            table: Some(TableMode::default()),
            grid: Some(GridMode::default()),
        }
    }
}

impl BuiltinModes {
    /// No built-in handlers
    pub fn none() -> Self {
        Self {
            array: None,
            table: None,
            grid: None,
        }
    }
}

/// Register the built-in handlers selected by `modes`.
///
/// Tables hold numeric columns the way arrays do, so registering the table
/// handler also registers the array handler (in its default mode when
/// `modes.array` is `None`).
pub fn register_builtin(registry: &mut HandlerRegistry, modes: &BuiltinModes) {
    let array_mode = match (modes.array, modes.table) {
        (Some(mode), _) => Some(mode),
        (None, Some(_)) => Some(ArrayMode::default()),
        (None, None) => None,
    };
    if let Some(mode) = array_mode {
        registry.register(Arc::new(ArrayProvider::new(mode)));
    }
    if let Some(mode) = modes.table {
        registry.register(Arc::new(TableProvider::new(mode)));
    }
    if let Some(mode) = modes.grid {
        registry.register(Arc::new(GridProvider::new(mode)));
    }
}

/// Write `data` to side file `name` and stamp its checksum into `record`
pub(crate) fn write_checked(
    store: &dyn SideFileStore,
    record: &mut HandlerRecord,
    name: String,
    data: &[u8],
) -> Result<()> {
    store.write_all(&name, data)?;
    record.insert(FIELD_CRC32C, compute_crc32c(data));
    record.attach_side_file(name);
    Ok(())
}

/// Read the side file referenced by `record`, verifying its checksum when
/// the record carries one
pub(crate) fn read_checked(store: &dyn SideFileStore, record: &HandlerRecord) -> Result<Vec<u8>> {
    let name = record.side_file()?;
    let data = store.read_to_vec(name)?;
    if record.get(FIELD_CRC32C).is_some() {
        let expected: u32 = record.field(FIELD_CRC32C)?;
        verify_crc32c(name, &data, expected)?;
    }
    Ok(data)
}

pub(crate) fn unknown_mode(handler: &str, mode: &str, known: &[&str]) -> IceError {
    IceError::HandlerConfig {
        handler: handler.to_string(),
        mode: mode.to_string(),
        reason: format!("unknown mode, expected one of: {}", known.join(", ")),
    }
}

/// Little-endian cursor over a byte payload
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| IceError::invalid_record(format!("truncated {} payload", self.what)))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn len_u64(&mut self) -> Result<usize> {
        usize::try_from(self.u64()?)
            .map_err(|_| IceError::invalid_record(format!("{} length overflows", self.what)))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(IceError::invalid_record(format!(
                "{} trailing bytes after {} payload",
                self.remaining(),
                self.what
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pulls_in_array() {
        let mut registry = HandlerRegistry::new();
        register_builtin(
            &mut registry,
            &BuiltinModes {
                table: Some(TableMode::Cols),
                ..BuiltinModes::none()
            },
        );
        assert!(registry.contains(TABLE_TYPE));
        assert!(registry.contains(ARRAY_TYPE));
        assert!(!registry.contains(GRID_TYPE));
    }

    #[test]
    fn defaults_register_everything() {
        let mut registry = HandlerRegistry::new();
        register_builtin(&mut registry, &BuiltinModes::default());
        let names: Vec<String> = registry.list().into_iter().map(|m| m.type_name).collect();
        assert_eq!(names, vec!["grid", "ndarray", "table"]);
    }

    #[test]
    fn byte_reader_bounds() {
        let mut reader = ByteReader::new(&[1, 0, 0, 0, 9], "test");
        assert_eq!(reader.u32().unwrap(), 1);
        assert!(reader.finish().is_err());
        assert_eq!(reader.u8().unwrap(), 9);
        assert!(reader.u8().is_err());
        reader.finish().unwrap();
    }

    #[test]
    fn modes_deserialize_from_toml_style_names() {
        let modes: BuiltinModes =
            serde_json::from_str(r#"{"array": "zst", "table": null}"#).unwrap();
        assert_eq!(modes.array, Some(ArrayMode::Zst));
        assert_eq!(modes.table, None);
        assert_eq!(modes.grid, Some(GridMode::Gridz));
    }
}
