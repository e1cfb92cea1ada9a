//! icer I/O - archives, the ice/deice protocol and built-in handlers
//!
//! This crate provides the storage layer and high-level APIs for icer:
//!
//! - Directory, zip and in-memory archive containers
//! - `ice` / `deice` over any [`Archive`]
//! - Archive metadata
//! - Built-in handlers for arrays, tables and grids
//!
//! ```no_run
//! use icer_io::{deice, ice, open_archive, register_builtin, BuiltinModes, OpenMode, Value};
//!
//! # fn main() -> icer_io::Result<()> {
//! let mut archive = open_archive("results.ice.zip", OpenMode::Write)?;
//! register_builtin(archive.handlers_mut(), &BuiltinModes::default());
//! ice(&*archive, None, [("answer", Value::from(42))])?;
//! archive.close()?;
//!
//! let archive = open_archive("results.ice.zip", OpenMode::Read)?;
//! let values = deice(&*archive, None, None)?;
//! assert_eq!(values["answer"], Value::Int(42));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod ice;
pub mod meta;
pub mod options;
pub mod plugins;
pub mod store;

use std::path::Path;

pub use archive::{
    normalize_zip_path, Archive, ArchiveKind, Container, DirArchive, MemoryArchive, ZipArchive,
};
pub use ice::{deice, ice, IceSummary};
pub use icer_codec::{
    EncodeOptions, HandlerMetadata, HandlerProvider, HandlerRecord, HandlerRegistry, Revivers,
    SideFileStore, TypeHandler,
};
pub use icer_format::{IceError, Limits, OpenMode, Record, Result, Value, ValueKind};
pub use meta::{read_meta, read_meta_json, Metadata};
pub use options::{ArchiveOptions, Compression};
pub use plugins::{register_builtin, BuiltinModes};
pub use store::{DirStore, MemoryStore};

/// Open the archive at `path` with default options; see [`open_archive_with`]
pub fn open_archive(path: impl AsRef<Path>, mode: OpenMode) -> Result<Box<dyn Archive>> {
    open_archive_with(path, mode, ArchiveOptions::default())
}

/// Open the archive at `path`, choosing the container kind from the path.
///
/// An existing directory opens as a [`DirArchive`] and an existing file as a
/// [`ZipArchive`]. A path that does not exist yet is a zip archive when it
/// ends in `.zip`, otherwise a directory archive. Zip archives must be
/// finished with [`Archive::close`].
pub fn open_archive_with(
    path: impl AsRef<Path>,
    mode: OpenMode,
    options: ArchiveOptions,
) -> Result<Box<dyn Archive>> {
    let path = path.as_ref();
    if is_zip_path(path) {
        Ok(Box::new(ZipArchive::open_with(path, mode, options)?))
    } else {
        Ok(Box::new(DirArchive::open_with(path, mode, options)?))
    }
}

fn is_zip_path(path: &Path) -> bool {
    if path.is_dir() {
        false
    } else if path.is_file() {
        true
    } else {
        path.extension().map_or(false, |ext| ext == "zip")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn zip_suffix_selects_zip_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = open_archive(tmp.path().join("out.ice.zip"), OpenMode::Write).unwrap();
        assert_eq!(archive.kind(), ArchiveKind::Zip);
        archive.close().unwrap();

        let archive = open_archive(tmp.path().join("out.ice.zip"), OpenMode::Read).unwrap();
        assert_eq!(archive.kind(), ArchiveKind::Zip);
        archive.close().unwrap();
    }

    #[test]
    fn other_paths_select_directory_archive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.ice");
        let archive = open_archive(&path, OpenMode::Write).unwrap();
        assert_eq!(archive.kind(), ArchiveKind::Directory);
        assert!(path.is_dir());
        archive.close().unwrap();

        let archive = open_archive(&path, OpenMode::Append).unwrap();
        assert_eq!(archive.kind(), ArchiveKind::Directory);
    }

    #[test]
    fn missing_archive_is_not_found() {
        let tmp = TempDir::new().unwrap();
        for name in ["gone", "gone.ice.zip"] {
            let err = open_archive(tmp.path().join(name), OpenMode::Read).unwrap_err();
            assert!(matches!(err, IceError::ArchiveNotFound { .. }), "{name}");
        }
    }
}
