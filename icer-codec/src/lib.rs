//! icer Codec - Handler machinery and the JSON tree codec
//!
//! This crate provides everything between a [`Value`] tree and the text of
//! an archive entry:
//!
//! - The side-file store capability handlers write through
//! - Type handler and handler provider traits
//! - The archive-scoped handler registry and per-call sessions
//! - The tree encoder and decoder with the `ice/` envelope
//! - Record revivers for records decoded without a handler

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decode;
pub mod encode;
pub mod handler;
pub mod registry;
pub mod revive;
pub mod side_file;

// Re-export commonly used types
pub use icer_format::{IceError, Limits, OpenMode, Record, Result, Value, ValueKind};

// Re-export our own types
pub use decode::Decoder;
pub use encode::{to_pretty_string, EncodeOptions, Encoded, Encoder};
pub use handler::{HandlerMetadata, HandlerProvider, HandlerRecord, TypeHandler};
pub use registry::{HandlerRegistry, HandlerSession};
pub use revive::{RecordReviver, Revivers};
pub use side_file::{new_side_file_name, SideFileSink, SideFileStore, SideFileWriter, StoreKind};
