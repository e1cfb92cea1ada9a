//! In-memory archive

use std::path::Path;
use std::sync::Arc;

use icer_codec::SideFileStore;
use icer_format::{IceError, OpenMode, Result};

use super::{Archive, ArchiveKind, Container};
use crate::options::ArchiveOptions;
use crate::store::MemoryStore;

/// Archive kept in process memory.
///
/// Files are shared with the [`MemoryStore`] it was opened over, so the same
/// contents can be reopened in another mode.
#[derive(Debug)]
pub struct MemoryArchive {
    store: MemoryStore,
    container: Container,
}

impl MemoryArchive {
    /// A fresh, empty, writable archive
    pub fn new() -> Self {
        let store = MemoryStore::new(true);
        Self::attach(store, OpenMode::Write, ArchiveOptions::default())
    }

    /// Open the files of `store` in `mode`.
    ///
    /// `Write` clears the files; `Create` requires there to be none.
    pub fn open(store: &MemoryStore, mode: OpenMode) -> Result<Self> {
        Self::open_with(store, mode, ArchiveOptions::default())
    }

    /// Open the files of `store` with options
    pub fn open_with(store: &MemoryStore, mode: OpenMode, options: ArchiveOptions) -> Result<Self> {
        let view = store.reopen(mode.is_writable());
        match mode {
            OpenMode::Write => view.clear()?,
            OpenMode::Create => {
                if !view.list()?.is_empty() {
                    return Err(IceError::AlreadyExists {
                        path: "<memory>".into(),
                    });
                }
            }
            OpenMode::Read | OpenMode::Append => {}
        }
        Ok(Self::attach(view, mode, options))
    }

    fn attach(store: MemoryStore, mode: OpenMode, options: ArchiveOptions) -> Self {
        Self {
            container: Container::new(Arc::new(store.clone()), mode, options),
            store,
        }
    }

    /// The store holding this archive's files
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive for MemoryArchive {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Memory
    }

    fn path(&self) -> Option<&Path> {
        None
    }

    fn container(&self) -> &Container {
        &self.container
    }

    fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_read_only_sees_entries() {
        let archive = MemoryArchive::new();
        archive.save("a", "1").unwrap();

        let reader = MemoryArchive::open(archive.store(), OpenMode::Read).unwrap();
        assert_eq!(reader.read("a").unwrap(), "1");
        assert!(matches!(reader.save("b", "2"), Err(IceError::ReadOnly { .. })));
    }

    #[test]
    fn write_clears_and_create_refuses() {
        let archive = MemoryArchive::new();
        archive.save("a", "1").unwrap();
        assert!(matches!(
            MemoryArchive::open(archive.store(), OpenMode::Create),
            Err(IceError::AlreadyExists { .. })
        ));
        let fresh = MemoryArchive::open(archive.store(), OpenMode::Write).unwrap();
        assert!(fresh.keys().unwrap().is_empty());
    }
}
