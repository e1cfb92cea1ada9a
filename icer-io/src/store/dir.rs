//! Directory-backed store
//!
//! Writes land in a hidden temporary file inside the root and are renamed
//! over the target when the writer finishes.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use icer_codec::{SideFileSink, SideFileStore, SideFileWriter, StoreKind};
use icer_format::{validate_name, IceError, Result};
use tempfile::NamedTempFile;
use tracing::debug;

/// Store over the files directly under one directory
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    writable: bool,
}

impl DirStore {
    /// Store over an existing directory
    pub fn new(root: impl Into<PathBuf>, writable: bool) -> Self {
        Self {
            root: root.into(),
            writable,
        }
    }

    /// Directory the store reads and writes
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn ensure_writable(&self, operation: &str, name: &str) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(IceError::read_only(format!("{} '{}'", operation, name)))
        }
    }
}

struct DirSink {
    file: NamedTempFile,
    target: PathBuf,
}

impl Write for DirSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl SideFileSink for DirSink {
    fn commit(self: Box<Self>) -> Result<()> {
        let DirSink { file, target } = *self;
        file.persist(&target).map_err(|e| IceError::Io(e.error))?;
        Ok(())
    }
}

impl SideFileStore for DirStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Directory
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path_of(name)?.exists())
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.path_of(name)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(IceError::SideFileNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn open_write(&self, name: &str) -> Result<SideFileWriter> {
        self.ensure_writable("write", name)?;
        let target = self.path_of(name)?;
        let file = tempfile::Builder::new()
            .prefix(".icer-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        Ok(SideFileWriter::new(name, Box::new(DirSink { file, target })))
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.ensure_writable("remove", name)?;
        let path = self.path_of(name)?;
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                debug!(name, "removed from store");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(IceError::SideFileNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.path_of(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_is_invisible_until_finished() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path(), true);

        let mut writer = store.open_write("a.txt").unwrap();
        writer.write_all(b"hello").unwrap();
        assert!(!store.exists("a.txt").unwrap());
        assert!(store.list().unwrap().is_empty());
        writer.finish().unwrap();

        assert_eq!(store.read_to_string("a.txt").unwrap(), "hello");
        assert_eq!(store.list().unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn dropped_writer_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path(), true);
        {
            let mut writer = store.open_write("a.txt").unwrap();
            writer.write_all(b"partial").unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn read_only_store_refuses_mutation() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let store = DirStore::new(dir.path(), false);

        assert!(matches!(
            store.open_write("b.txt"),
            Err(IceError::ReadOnly { .. })
        ));
        assert!(matches!(store.remove("a.txt"), Err(IceError::ReadOnly { .. })));
        assert!(dir.path().join("a.txt").exists());
    }

    #[test]
    fn remove_handles_directories_and_missing_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("side.d")).unwrap();
        fs::write(dir.path().join("side.d").join("x.bin"), [1u8]).unwrap();
        let store = DirStore::new(dir.path(), true);

        store.remove("side.d").unwrap();
        assert!(!dir.path().join("side.d").exists());
        assert!(matches!(
            store.remove("side.d"),
            Err(IceError::SideFileNotFound { .. })
        ));
    }

    #[test]
    fn names_cannot_escape_the_root() {
        let dir = TempDir::new().unwrap();
        let store = DirStore::new(dir.path(), true);
        assert!(store.open_write("../escape.txt").is_err());
        assert!(store.local_path("../escape.txt").is_none());
        assert!(matches!(
            store.open_read("missing.txt"),
            Err(IceError::SideFileNotFound { .. })
        ));
    }
}
