//! Type handler contract
//!
//! A handler intercepts records of one type name while the tree encoder walks
//! a value. On the way out it turns the record into a [`HandlerRecord`] (plus
//! any side files it writes); on the way back it rebuilds the value from that
//! record.
//!
//! Handlers are configured once per archive as [`HandlerProvider`]s and bound
//! to the archive's side-file store when a session opens.
//!
//! # Example
//!
//! ```rust,ignore
//! use icer_codec::{HandlerProvider, HandlerRecord, SideFileStore, TypeHandler};
//!
//! struct BlobHandler {
//!     store: Arc<dyn SideFileStore>,
//! }
//!
//! impl TypeHandler for BlobHandler {
//!     fn type_name(&self) -> &str { "blob" }
//!     fn mode(&self) -> &str { "raw" }
//!
//!     fn flatten(&self, value: &Record, record: &mut HandlerRecord) -> Result<()> {
//!         let name = new_side_file_name("raw");
//!         self.store.write_all(&name, value.field("data")?.as_bytes().unwrap_or_default())?;
//!         record.attach_side_file(name);
//!         Ok(())
//!     }
//!
//!     fn restore(&self, record: &HandlerRecord) -> Result<Value> {
//!         let data = self.store.read_to_vec(record.side_file()?)?;
//!         Ok(Record::new("blob").with("data", Value::Bytes(data)).into())
//!     }
//! }
//! ```

use std::sync::Arc;

use icer_format::constants::{FIELD_FILE_UUID, FIELD_MODE, TAG_HANDLER, TAG_PREFIX};
use icer_format::{IceError, Record, Result, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::side_file::SideFileStore;

/// Description of a handler provider, listed in archive metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerMetadata {
    /// Record type name the handler intercepts
    pub type_name: String,
    /// Representation the handler writes
    pub mode: String,
    /// Human-readable description
    pub description: String,
    /// Handler version
    pub version: String,
}

/// A handler bound to one archive's side-file store
pub trait TypeHandler: Send + Sync {
    /// Record type name this handler intercepts
    fn type_name(&self) -> &str;

    /// Representation this handler writes
    fn mode(&self) -> &str;

    /// Describe `value` in `record`, writing bulk data to side files.
    ///
    /// Every call must use a fresh side-file name.
    fn flatten(&self, value: &Record, record: &mut HandlerRecord) -> Result<()>;

    /// Rebuild the value described by `record`.
    ///
    /// Dispatch on [`HandlerRecord::mode`], not on [`TypeHandler::mode`]: the
    /// archive may have been written under a different configuration.
    fn restore(&self, record: &HandlerRecord) -> Result<Value>;
}

/// Archive-level handler configuration
pub trait HandlerProvider: Send + Sync {
    /// Record type name the bound handler intercepts
    fn type_name(&self) -> &str;

    /// Representation the bound handler writes
    fn mode(&self) -> &str;

    /// Returns metadata about this provider
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            type_name: self.type_name().to_string(),
            mode: self.mode().to_string(),
            description: "Custom type handler".to_string(),
            version: "1.0.0".to_string(),
        }
    }

    /// Build a handler bound to `store`.
    ///
    /// Fails with [`IceError::HandlerConfig`] when the configured mode cannot
    /// work against this kind of store.
    fn bind(&self, store: Arc<dyn SideFileStore>) -> Result<Box<dyn TypeHandler>>;
}

/// The JSON object a handler emits for one intercepted record
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRecord {
    fields: Map<String, JsonValue>,
    side_files: Vec<String>,
}

impl HandlerRecord {
    /// Start a record for `type_name` written in `mode`
    pub fn new(type_name: &str, mode: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(TAG_HANDLER.to_string(), JsonValue::from(type_name));
        fields.insert(FIELD_MODE.to_string(), JsonValue::from(mode));
        Self {
            fields,
            side_files: Vec::new(),
        }
    }

    /// Rebuild a record from decoded JSON
    pub fn from_json(fields: Map<String, JsonValue>) -> Result<Self> {
        match fields.get(TAG_HANDLER) {
            Some(JsonValue::String(_)) => {}
            _ => {
                return Err(IceError::invalid_record(format!(
                    "handler record without a '{}' string",
                    TAG_HANDLER
                )))
            }
        }
        match fields.get(FIELD_MODE) {
            Some(JsonValue::String(_)) => {}
            _ => {
                return Err(IceError::invalid_record(format!(
                    "handler record without a '{}' string",
                    FIELD_MODE
                )))
            }
        }

        let side_files = match fields.get(FIELD_FILE_UUID) {
            Some(JsonValue::String(name)) => vec![name.clone()],
            _ => Vec::new(),
        };

        Ok(Self { fields, side_files })
    }

    /// Record type name
    pub fn type_name(&self) -> &str {
        self.fields
            .get(TAG_HANDLER)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    /// Mode the record was written in
    pub fn mode(&self) -> &str {
        self.fields
            .get(FIELD_MODE)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    /// Set a field, refusing envelope tags and `mode`
    pub fn try_insert(&mut self, key: &str, value: impl Into<JsonValue>) -> Result<()> {
        if key.starts_with(TAG_PREFIX) || key == FIELD_MODE {
            return Err(IceError::invalid_record(format!(
                "handler '{}' may not set reserved field '{}'",
                self.type_name(),
                key
            )));
        }
        self.fields.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Set a field. Writes to envelope tags and `mode` are dropped with a
    /// warning.
    pub fn insert(&mut self, key: &str, value: impl Into<JsonValue>) {
        if let Err(err) = self.try_insert(key, value) {
            warn!(error = %err, "ignored handler field");
        }
    }

    /// Set a field from any serializable value
    pub fn insert_serialized<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.try_insert(key, json)
    }

    /// Borrow a field
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Deserialize a required field
    pub fn field<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.fields.get(key).ok_or_else(|| {
            IceError::invalid_record(format!(
                "'{}' record has no field '{}'",
                self.type_name(),
                key
            ))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            IceError::invalid_record(format!(
                "'{}' record field '{}': {}",
                self.type_name(),
                key,
                e
            ))
        })
    }

    /// Reference `name` as this record's side file and take ownership of it
    pub fn attach_side_file(&mut self, name: String) {
        self.fields
            .insert(FIELD_FILE_UUID.to_string(), JsonValue::from(name.as_str()));
        self.own_side_file(name);
    }

    /// Take ownership of an additional side file without referencing it in
    /// `file_uuid`
    pub fn own_side_file(&mut self, name: String) {
        if !self.side_files.contains(&name) {
            self.side_files.push(name);
        }
    }

    /// Name of the side file referenced by `file_uuid`
    pub fn side_file(&self) -> Result<&str> {
        self.fields
            .get(FIELD_FILE_UUID)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                IceError::invalid_record(format!(
                    "'{}' record in mode '{}' has no '{}'",
                    self.type_name(),
                    self.mode(),
                    FIELD_FILE_UUID
                ))
            })
    }

    /// Every side file this record owns
    pub fn owned_side_files(&self) -> &[String] {
        &self.side_files
    }

    /// Split into the JSON object and the owned side files
    pub fn into_parts(self) -> (Map<String, JsonValue>, Vec<String>) {
        (self.fields, self.side_files)
    }
}
