//! Archive options

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use icer_codec::EncodeOptions;
use icer_format::{IceError, Limits};
use serde::{Deserialize, Serialize};

/// Compression method for zip archive members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Members are stored uncompressed
    Stored,
    /// Members are deflate-compressed
    #[default]
    Deflated,
}

impl Compression {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Stored => "stored",
            Compression::Deflated => "deflated",
        }
    }

    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Stored => zip::CompressionMethod::Stored,
            Compression::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stored" | "store" | "none" => Ok(Compression::Stored),
            "deflated" | "deflate" => Ok(Compression::Deflated),
            other => Err(IceError::InvalidName {
                name: other.to_string(),
                reason: "expected 'stored' or 'deflated'".to_string(),
            }),
        }
    }
}

/// Options shared by every archive kind
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Parent directory for zip staging directories (default: system temp)
    pub working_dir: Option<PathBuf>,
    /// Compression of zip members
    pub compression: Compression,
    /// Entry encoding; its limits also bound decoding
    pub encode: EncodeOptions,
}

impl ArchiveOptions {
    /// Limits applied to every entry
    pub fn limits(&self) -> &Limits {
        &self.encode.limits
    }

    /// Builder-style staging directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Builder-style compression
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ArchiveOptions::default();
        assert!(options.working_dir.is_none());
        assert_eq!(options.compression, Compression::Deflated);
        assert!(options.encode.pretty);
        assert_eq!(options.limits().max_depth, 100);
    }

    #[test]
    fn compression_parses() {
        assert_eq!("stored".parse::<Compression>().unwrap(), Compression::Stored);
        assert_eq!("deflate".parse::<Compression>().unwrap(), Compression::Deflated);
        assert!("lzma".parse::<Compression>().is_err());
    }
}
