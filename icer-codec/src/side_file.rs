//! Side-file store capability
//!
//! Handlers never touch the filesystem directly. Each handler is bound to the
//! [`SideFileStore`] of the archive it serves and performs every read and
//! write through it, so the same handler works against a plain directory, a
//! zip staging directory or an in-memory container.

use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;

use icer_format::{IceError, Result};
use uuid::Uuid;

/// Backing medium of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Files live in process memory; no local paths exist
    Memory,
    /// Files live in a directory on the local filesystem
    Directory,
}

impl StoreKind {
    /// Whether side files can be addressed as local filesystem paths
    pub fn has_local_files(self) -> bool {
        matches!(self, StoreKind::Directory)
    }

    /// Lowercase name used in metadata and error messages
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Directory => "directory",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination of a [`SideFileWriter`]; only visible under its final name
/// once committed.
pub trait SideFileSink: Write + Send {
    /// Publish the written bytes under the final name
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Scoped writer for one side file.
///
/// Nothing is visible under the side-file name until [`finish`] succeeds;
/// dropping an unfinished writer discards what was written.
///
/// [`finish`]: SideFileWriter::finish
pub struct SideFileWriter {
    name: String,
    sink: Box<dyn SideFileSink>,
    bytes_written: u64,
}

impl SideFileWriter {
    /// Wrap a store-specific sink
    pub fn new(name: impl Into<String>, sink: Box<dyn SideFileSink>) -> Self {
        Self {
            name: name.into(),
            sink,
            bytes_written: 0,
        }
    }

    /// Side-file name this writer publishes to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Flush and publish; returns the number of bytes written
    pub fn finish(mut self) -> Result<u64> {
        self.sink.flush()?;
        self.sink.commit()?;
        Ok(self.bytes_written)
    }
}

impl Write for SideFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.sink.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }
}

impl fmt::Debug for SideFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideFileWriter")
            .field("name", &self.name)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

/// Byte file store keyed by name, scoped to one archive container
pub trait SideFileStore: Send + Sync + fmt::Debug {
    /// Backing medium
    fn kind(&self) -> StoreKind;

    /// Whether writes and removals are allowed
    fn is_writable(&self) -> bool;

    /// Whether a file (or side directory) exists under `name`
    fn exists(&self, name: &str) -> Result<bool>;

    /// Open `name` for reading; the handle closes when dropped
    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    /// Open `name` for an atomic write
    fn open_write(&self, name: &str) -> Result<SideFileWriter>;

    /// Delete `name` (file or side directory)
    fn remove(&self, name: &str) -> Result<()>;

    /// Names of every visible file in the store, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Local filesystem path for `name`, if the store has one
    fn local_path(&self, name: &str) -> Option<PathBuf>;

    /// Read the whole of `name`
    fn read_to_vec(&self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_read(name)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read the whole of `name` as UTF-8
    fn read_to_string(&self, name: &str) -> Result<String> {
        let bytes = self.read_to_vec(name)?;
        String::from_utf8(bytes)
            .map_err(|e| IceError::invalid_record(format!("'{}' is not UTF-8: {}", name, e)))
    }

    /// Atomically replace `name` with `data`
    fn write_all(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut writer = self.open_write(name)?;
        writer.write_all(data)?;
        writer.finish()?;
        Ok(())
    }
}

/// Fresh side-file name: a random UUID plus a mode-derived extension.
///
/// Handlers get no context about where in the tree a value sits, so names are
/// independent of the owning entry.
pub fn new_side_file_name(extension: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), extension)
}
