//! Archive open modes

use std::fmt;
use std::str::FromStr;

use crate::error::IceError;

/// How an archive container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Existing archive, no mutation allowed (`r`)
    Read,
    /// Fresh archive; any previous contents are destroyed (`w`)
    Write,
    /// Existing archive opened for adding, replacing and removing entries (`a`)
    Append,
    /// Fresh archive that refuses to replace an existing one (`x`)
    Create,
}

impl OpenMode {
    /// Whether entries and side files may be written
    pub fn is_writable(self) -> bool {
        !matches!(self, OpenMode::Read)
    }

    /// Whether the archive must already exist
    pub fn requires_existing(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::Append)
    }

    /// Single-letter code (`r`, `w`, `a`, `x`)
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::Append => "a",
            OpenMode::Create => "x",
        }
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        OpenMode::Read
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = IceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            "a" | "append" => Ok(OpenMode::Append),
            "x" | "create" => Ok(OpenMode::Create),
            other => Err(IceError::InvalidName {
                name: other.to_string(),
                reason: "open mode must be one of r, w, a, x".to_string(),
            }),
        }
    }
}
