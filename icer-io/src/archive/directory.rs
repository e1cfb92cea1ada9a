//! Directory archive

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use icer_format::{IceError, OpenMode, Result};
use tracing::info;

use super::{Archive, ArchiveKind, Container};
use crate::options::ArchiveOptions;
use crate::store::DirStore;

/// Archive kept as a plain directory
#[derive(Debug)]
pub struct DirArchive {
    root: PathBuf,
    container: Container,
}

impl DirArchive {
    /// Open `path` with default options
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, ArchiveOptions::default())
    }

    /// Open `path`.
    ///
    /// - `Read`/`Append`: the directory must exist.
    /// - `Write`: any existing directory is deleted and recreated.
    /// - `Create`: fails with [`IceError::AlreadyExists`] if the path exists.
    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode, options: ArchiveOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        match mode {
            OpenMode::Read | OpenMode::Append => {
                if !root.is_dir() {
                    return Err(IceError::ArchiveNotFound { path: root });
                }
            }
            OpenMode::Write => {
                if root.is_dir() {
                    fs::remove_dir_all(&root)?;
                } else if root.exists() {
                    fs::remove_file(&root)?;
                }
                fs::create_dir_all(&root)?;
            }
            OpenMode::Create => {
                if root.exists() {
                    return Err(IceError::AlreadyExists { path: root });
                }
                fs::create_dir_all(&root)?;
            }
        }

        info!(path = %root.display(), mode = %mode, "opened directory archive");
        Ok(Self::attach(root, mode, options))
    }

    /// Archive over a directory that already exists, with no mode checks
    pub(crate) fn attach(root: PathBuf, mode: OpenMode, options: ArchiveOptions) -> Self {
        let store = DirStore::new(root.clone(), mode.is_writable());
        Self {
            container: Container::new(Arc::new(store), mode, options),
            root,
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Archive for DirArchive {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Directory
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.root)
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
    use tempfile::TempDir;

    #[test]
    fn read_requires_existing_directory() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            DirArchive::open(&missing, OpenMode::Read),
            Err(IceError::ArchiveNotFound { .. })
        ));
        assert!(matches!(
            DirArchive::open(&missing, OpenMode::Append),
            Err(IceError::ArchiveNotFound { .. })
        ));
        assert!(!missing.exists());
    }

    #[test]
    fn write_recreates_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("arc");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("old.json"), "1").unwrap();

        let archive = DirArchive::open(&root, OpenMode::Write).unwrap();
        assert!(archive.keys().unwrap().is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn create_refuses_existing_path() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("arc");
        DirArchive::open(&root, OpenMode::Create).unwrap();
        assert!(matches!(
            DirArchive::open(&root, OpenMode::Create),
            Err(IceError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn append_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("arc");
        DirArchive::open(&root, OpenMode::Write)
            .unwrap()
            .save("a", "1")
            .unwrap();
        let archive = DirArchive::open(&root, OpenMode::Append).unwrap();
        archive.save("b", "2").unwrap();
        assert_eq!(archive.keys().unwrap().len(), 2);
    }
}
