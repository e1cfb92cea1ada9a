//! Archive containers
//!
//! An archive is a set of named entries (`<name>.json`) plus the side files
//! those entries own, kept in a directory, a zip file or memory. Every kind
//! exposes the same operations through the [`Archive`] trait; the kinds
//! differ only in how they open and how they close.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use icer_codec::{HandlerProvider, HandlerRegistry, SideFileStore, SideFileWriter};
use icer_format::{OpenMode, Result};

mod container;
mod directory;
mod memory;
mod zip_archive;

pub use container::Container;
pub use directory::DirArchive;
pub use memory::MemoryArchive;
pub use zip_archive::{normalize_zip_path, ZipArchive};

use crate::options::ArchiveOptions;

/// Backing medium of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Plain directory
    Directory,
    /// Zip file staged through a temporary directory
    Zip,
    /// Process memory
    Memory,
}

impl ArchiveKind {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::Directory => "directory",
            ArchiveKind::Zip => "zip",
            ArchiveKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations shared by every archive kind
pub trait Archive: Send {
    /// Backing medium
    fn kind(&self) -> ArchiveKind;

    /// Path identifying the archive, if it lives on disk
    fn path(&self) -> Option<&Path>;

    /// Shared entry bookkeeping
    fn container(&self) -> &Container;

    /// Mutable shared entry bookkeeping
    fn container_mut(&mut self) -> &mut Container;

    /// Finish the archive. Zip archives are written here; other kinds have
    /// nothing to flush.
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    /// Mode the archive was opened in
    fn mode(&self) -> OpenMode {
        self.container().mode()
    }

    /// Options the archive was opened with
    fn options(&self) -> &ArchiveOptions {
        self.container().options()
    }

    /// Write `<name>.json`, replacing any previous text
    fn save(&self, name: &str, text: &str) -> Result<()> {
        self.container().save(name, text)
    }

    /// Write `<name>.json` plus its side-file ownership manifest
    fn save_owned(&self, name: &str, text: &str, side_files: &[String]) -> Result<()> {
        self.container().save_owned(name, text, side_files)
    }

    /// Text of `<name>.json`
    fn read(&self, name: &str) -> Result<String> {
        self.container().read(name)
    }

    /// Names of every entry, `meta` included
    fn keys(&self) -> Result<BTreeSet<String>> {
        self.container().keys()
    }

    /// Whether entry `name` exists
    fn contains(&self, name: &str) -> Result<bool> {
        self.container().contains(name)
    }

    /// Delete entry `name` and every side file it owns
    fn remove(&self, name: &str) -> Result<()> {
        self.container().remove(name)
    }

    /// The store handlers write side files through
    fn side_files(&self) -> Arc<dyn SideFileStore> {
        self.container().store()
    }

    /// Open side file `name` for reading; closed when dropped
    fn open_side_file(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        self.container().open_side_file(name)
    }

    /// Open side file `name` for an atomic write; published by `finish`
    fn create_side_file(&self, name: &str) -> Result<SideFileWriter> {
        self.container().create_side_file(name)
    }

    /// Handler registry
    fn handlers(&self) -> &HandlerRegistry {
        self.container().handlers()
    }

    /// Mutable handler registry
    fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        self.container_mut().handlers_mut()
    }

    /// Register a handler provider on this archive only
    fn register(&mut self, provider: Arc<dyn HandlerProvider>) {
        self.container_mut().register(provider)
    }
}

impl fmt::Debug for dyn Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .field("mode", &self.mode())
            .finish()
    }
}
