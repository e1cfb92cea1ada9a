//! Error types for icer archives

use std::path::PathBuf;
use thiserror::Error;

/// icer error types
#[derive(Debug, Error)]
pub enum IceError {
    /// Archive root (directory or zip file) does not exist.
    #[error("Archive not found: {}", .path.display())]
    ArchiveNotFound {
        /// Path that was expected to hold the archive
        path: PathBuf,
    },
    /// Archive already exists and overwriting was not requested.
    #[error("Archive already exists: {} (open in write mode to replace it)", .path.display())]
    AlreadyExists {
        /// Path of the existing archive
        path: PathBuf,
    },
    /// Requested entry is not present in the archive.
    #[error("Entry not found: '{key}'")]
    KeyNotFound {
        /// Entry name
        key: String,
    },
    /// A side file referenced by a record is missing.
    #[error("Side file not found: '{name}'")]
    SideFileNotFound {
        /// Side-file name
        name: String,
    },
    /// Mutation attempted on a container opened read-only.
    #[error("Archive is read-only: cannot {operation}")]
    ReadOnly {
        /// Operation that was refused
        operation: String,
    },
    /// Value name collides with a name the archive reserves for itself.
    #[error("'{name}' is a reserved entry name")]
    ReservedName {
        /// Offending name
        name: String,
    },
    /// Entry or side-file name cannot be stored in a container.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Why the name was rejected
        reason: String,
    },
    /// Encoded record carries a tag no decoder or handler understands.
    #[error("Unrecognized value '{tag}': register a handler for this type")]
    UnrecognizedValue {
        /// Envelope tag or record type name
        tag: String,
    },
    /// Handler asked to work in a mode its container cannot support.
    #[error("Handler '{handler}' cannot use mode '{mode}': {reason}")]
    HandlerConfig {
        /// Handler type name
        handler: String,
        /// Requested mode
        mode: String,
        /// Explanation of the incompatibility
        reason: String,
    },
    /// Record is missing a field or carries a field of the wrong shape.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// Side-file payload failed CRC32C verification.
    #[error("Checksum mismatch in '{name}': expected {expected:#010x}, found {actual:#010x}")]
    ChecksumMismatch {
        /// Side-file name
        name: String,
        /// Checksum stored in the record
        expected: u32,
        /// Checksum computed from the payload
        actual: u32,
    },
    /// A configured limit was exceeded.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    /// Backing container (zip file) could not be read or written.
    #[error("Container error: {0}")]
    Container(String),
    /// I/O operation failed while reading or writing data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IceError {
    /// Shorthand for [`IceError::InvalidRecord`]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        IceError::InvalidRecord(message.into())
    }

    /// Shorthand for [`IceError::ReadOnly`]
    pub fn read_only(operation: impl Into<String>) -> Self {
        IceError::ReadOnly {
            operation: operation.into(),
        }
    }

    /// Whether this error means "something requested does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IceError::ArchiveNotFound { .. }
                | IceError::KeyNotFound { .. }
                | IceError::SideFileNotFound { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IceError>;
