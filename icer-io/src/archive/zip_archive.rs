//! Zip archive
//!
//! While open, a zip archive is a directory archive rooted at a private
//! staging directory. The zip file itself is only read when the archive
//! opens and only written when it closes. An archive in `Read` or `Append`
//! mode that is dropped without [`ZipArchive::close`] leaves the zip file
//! exactly as it was; `Write` mode removes the previous zip when it opens.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use icer_format::constants::{STAGING_PREFIX, STAGING_SUFFIX, ZIP_SUFFIX};
use icer_format::{IceError, OpenMode, Result};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::{Archive, ArchiveKind, Container, DirArchive};
use crate::options::ArchiveOptions;

/// Give `path` the `.ice.zip` suffix, replacing its last extension
pub fn normalize_zip_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let suffix = format!(".{}", ZIP_SUFFIX);
    if path.to_string_lossy().ends_with(&suffix) {
        path.to_path_buf()
    } else {
        path.with_extension(ZIP_SUFFIX)
    }
}

fn zip_error(context: &str, err: zip::result::ZipError) -> IceError {
    match err {
        zip::result::ZipError::Io(e) => IceError::Io(e),
        other => IceError::Container(format!("{}: {}", context, other)),
    }
}

/// Archive kept as a zip file
#[derive(Debug)]
pub struct ZipArchive {
    path: PathBuf,
    inner: DirArchive,
    staging: Option<TempDir>,
}

impl ZipArchive {
    /// Open `path` (normalized to `.ice.zip`) with default options
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, ArchiveOptions::default())
    }

    /// Open `path` (normalized to `.ice.zip`).
    ///
    /// - `Read`/`Append`: the zip file must exist; its members are extracted
    ///   into the staging directory.
    /// - `Write`: starts empty; an existing zip file is deleted here, so it
    ///   stays absent until `close` writes the new one.
    /// - `Create`: fails with [`IceError::AlreadyExists`] if the zip exists.
    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode, options: ArchiveOptions) -> Result<Self> {
        let path = normalize_zip_path(path);
        match mode {
            OpenMode::Read | OpenMode::Append if !path.is_file() => {
                return Err(IceError::ArchiveNotFound { path });
            }
            OpenMode::Create if path.exists() => {
                return Err(IceError::AlreadyExists { path });
            }
            _ => {}
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX).suffix(STAGING_SUFFIX);
        let staging = match &options.working_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };
        debug!(staging = %staging.path().display(), "created zip staging directory");

        if mode == OpenMode::Write && path.is_file() {
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed previous zip for write mode");
        }

        if matches!(mode, OpenMode::Read | OpenMode::Append) {
            let file = File::open(&path)?;
            let mut zip = zip::ZipArchive::new(BufReader::new(file))
                .map_err(|e| zip_error("open zip", e))?;
            let members = zip.len();
            zip.extract(staging.path())
                .map_err(|e| zip_error("extract zip", e))?;
            debug!(members, "extracted zip into staging");
        }

        info!(path = %path.display(), mode = %mode, "opened zip archive");
        let inner = DirArchive::attach(staging.path().to_path_buf(), mode, options);
        Ok(Self {
            path,
            inner,
            staging: Some(staging),
        })
    }

    /// Normalized zip path
    pub fn zip_path(&self) -> &Path {
        &self.path
    }

    /// Staging directory that holds the archive while it is open
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.as_ref().map(|s| s.path())
    }

    /// Write the staging directory to the zip file (writable modes only) and
    /// remove the staging directory. Returns the zip path.
    pub fn close(mut self) -> Result<PathBuf> {
        let staging = self
            .staging
            .take()
            .ok_or_else(|| IceError::Internal("zip archive closed twice".to_string()))?;

        if self.inner.mode().is_writable() {
            self.write_zip(staging.path())?;
            info!(path = %self.path.display(), "wrote zip archive");
        } else {
            debug!(path = %self.path.display(), "closed read-only zip archive");
        }

        staging.close()?;
        Ok(self.path.clone())
    }

    fn write_zip(&self, staging: &Path) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".icer-")
            .suffix(".zip.tmp")
            .tempfile_in(&parent)?;

        let options = SimpleFileOptions::default()
            .compression_method(self.inner.options().compression.method());
        let mut writer = ZipWriter::new(BufWriter::new(tmp));

        let walker = WalkDir::new(staging)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        let mut files = 0usize;
        for entry in walker {
            let entry = entry.map_err(|e| IceError::Io(io::Error::other(e)))?;
            let relative = entry
                .path()
                .strip_prefix(staging)
                .map_err(|e| IceError::Internal(e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_dir() {
                writer
                    .add_directory(format!("{}/", name), options)
                    .map_err(|e| zip_error("add directory", e))?;
            } else if entry.file_type().is_file() {
                writer
                    .start_file(name, options)
                    .map_err(|e| zip_error("start member", e))?;
                let mut file = File::open(entry.path())?;
                io::copy(&mut file, &mut writer)?;
                files += 1;
            }
        }

        let buffered = writer.finish().map_err(|e| zip_error("finish zip", e))?;
        let tmp: NamedTempFile = buffered
            .into_inner()
            .map_err(|e| IceError::Io(e.into_error()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| IceError::Io(e.error))?;
        debug!(files, "zip files written");
        Ok(())
    }
}

impl Drop for ZipArchive {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take() {
            if self.inner.mode().is_writable() {
                warn!(
                    path = %self.path.display(),
                    "zip archive dropped without close; changes discarded"
                );
            }
            if let Err(e) = staging.close() {
                warn!(error = %e, "failed to remove zip staging directory");
            }
        }
    }
}

impl Archive for ZipArchive {
    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Zip
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn container(&self) -> &Container {
        self.inner.container()
    }

    fn container_mut(&mut self) -> &mut Container {
        self.inner.container_mut()
    }

    fn close(self: Box<Self>) -> Result<()> {
        ZipArchive::close(*self).map(|_| ())
    }
}
