//! In-memory store

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use icer_codec::{SideFileSink, SideFileStore, SideFileWriter, StoreKind};
use icer_format::{validate_name, IceError, Result};

type Files = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// Store keeping every file in process memory.
///
/// Clones share the same files. [`MemoryStore::reopen`] gives another view
/// of the same files with a different access mode.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Files,
    writable: bool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(writable: bool) -> Self {
        Self {
            files: Files::default(),
            writable,
        }
    }

    /// View of the same files with another access mode
    pub fn reopen(&self, writable: bool) -> Self {
        Self {
            files: Arc::clone(&self.files),
            writable,
        }
    }

    /// Drop every file
    pub fn clear(&self) -> Result<()> {
        if !self.writable {
            return Err(IceError::read_only("clear the store"));
        }
        lock(&self.files).clear();
        Ok(())
    }

    /// Total bytes held
    pub fn total_bytes(&self) -> usize {
        lock(&self.files).values().map(Vec::len).sum()
    }
}

fn lock(files: &Files) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
    files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct MemorySink {
    name: String,
    buf: Vec<u8>,
    files: Files,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SideFileSink for MemorySink {
    fn commit(self: Box<Self>) -> Result<()> {
        let MemorySink { name, buf, files } = *self;
        lock(&files).insert(name, buf);
        Ok(())
    }
}

impl SideFileStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(lock(&self.files).contains_key(name))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        validate_name(name)?;
        let data = lock(&self.files)
            .get(name)
            .cloned()
            .ok_or_else(|| IceError::SideFileNotFound {
                name: name.to_string(),
            })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, name: &str) -> Result<SideFileWriter> {
        if !self.writable {
            return Err(IceError::read_only(format!("write '{}'", name)));
        }
        validate_name(name)?;
        Ok(SideFileWriter::new(
            name,
            Box::new(MemorySink {
                name: name.to_string(),
                buf: Vec::new(),
                files: Arc::clone(&self.files),
            }),
        ))
    }

    fn remove(&self, name: &str) -> Result<()> {
        if !self.writable {
            return Err(IceError::read_only(format!("remove '{}'", name)));
        }
        validate_name(name)?;
        match lock(&self.files).remove(name) {
            Some(_) => Ok(()),
            None => Err(IceError::SideFileNotFound {
                name: name.to_string(),
            }),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(lock(&self.files).keys().cloned().collect())
    }

    fn local_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopened_views_share_files() {
        let store = MemoryStore::new(true);
        store.write_all("a.bin", &[1, 2, 3]).unwrap();

        let reader = store.reopen(false);
        assert_eq!(reader.read_to_vec("a.bin").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            reader.write_all("b.bin", &[]),
            Err(IceError::ReadOnly { .. })
        ));
        assert!(matches!(reader.remove("a.bin"), Err(IceError::ReadOnly { .. })));
        assert_eq!(store.total_bytes(), 3);
    }

    #[test]
    fn unfinished_writes_are_discarded() {
        let store = MemoryStore::new(true);
        {
            let mut writer = store.open_write("a.bin").unwrap();
            writer.write_all(b"xyz").unwrap();
        }
        assert!(!store.exists("a.bin").unwrap());
    }

    #[test]
    fn no_local_paths() {
        let store = MemoryStore::new(true);
        assert!(store.local_path("a.bin").is_none());
        assert!(!store.kind().has_local_files());
    }

    #[test]
    fn clear_requires_write_access() {
        let store = MemoryStore::new(true);
        store.write_all("a.bin", &[1]).unwrap();
        assert!(store.reopen(false).clear().is_err());
        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
