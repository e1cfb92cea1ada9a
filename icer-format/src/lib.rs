//! icer Format - Core primitives for icer archives
//!
//! This crate provides the building blocks shared by every icer crate, with
//! no I/O dependencies. It includes:
//!
//! - The value model (`Value`, `Record`)
//! - Error types
//! - Archive open modes
//! - Reserved names, suffixes and envelope tags
//! - Decoder limits
//! - CRC32C payload checksums

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
pub mod constants;
pub mod error;
pub mod limits;
pub mod mode;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use error::{IceError, Result};
pub use limits::Limits;
pub use mode::OpenMode;
pub use types::ValueKind;
pub use value::{Record, Value};

/// Check that `name` can be stored as a file directly under an archive root.
///
/// Entry names and side-file names share these rules: non-empty, no path
/// separators, no leading `.` (hidden files are used for in-flight writes)
/// and no NUL bytes.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else if name.starts_with('.') {
        Some("name starts with '.'")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(IceError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
