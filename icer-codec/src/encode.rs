//! Tree encoder: [`Value`] to JSON record text
//!
//! Records whose type name has a handler in the session are handed to that
//! handler, which may write side files; everything else is encoded inline
//! using the `ice/` envelope.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use icer_format::constants::{
    PRETTY_INDENT, TAG_BYTES, TAG_FIELDS, TAG_FLOAT, TAG_MAP, TAG_PREFIX, TAG_RECORD,
};
use icer_format::limits::json_depth;
use icer_format::{IceError, Limits, Record, Result, Value};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Number, Value as JsonValue};
use tracing::debug;

use crate::handler::HandlerRecord;
use crate::registry::HandlerSession;

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Pretty-print with four-space indentation (default: true)
    pub pretty: bool,
    /// Depth and size limits
    pub limits: Limits,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            limits: Limits::default(),
        }
    }
}

/// Output of encoding one entry
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    /// Record text
    pub text: String,
    /// Side files written by handlers, in encounter order
    pub side_files: Vec<String>,
}

/// Encodes value trees against a handler session
pub struct Encoder<'s> {
    session: &'s HandlerSession,
    options: EncodeOptions,
}

impl<'s> Encoder<'s> {
    /// Create an encoder with default options
    pub fn new(session: &'s HandlerSession) -> Self {
        Self {
            session,
            options: EncodeOptions::default(),
        }
    }

    /// Replace the options
    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Encode `value` to record text
    pub fn encode(&self, value: &Value) -> Result<Encoded> {
        let mut side_files = Vec::new();
        let json = self.to_json(value, 0, &mut side_files)?;
        let text = if self.options.pretty {
            to_pretty_string(&json)?
        } else {
            serde_json::to_string(&json)?
        };
        self.options.limits.check_record_len(text.len())?;
        Ok(Encoded { text, side_files })
    }

    /// Encode `value`, which sits inside `depth` enclosing JSON containers
    fn to_json(&self, value: &Value, depth: usize, side_files: &mut Vec<String>) -> Result<JsonValue> {
        let limits = &self.options.limits;
        let json = match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => {
                let json = encode_float(*f);
                limits.check_depth(depth + json_depth(&json))?;
                json
            }
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Bytes(bytes) => {
                limits.check_depth(depth + 1)?;
                tagged(TAG_BYTES, JsonValue::String(BASE64.encode(bytes)))
            }
            Value::Seq(items) => {
                limits.check_depth(depth + 1)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.to_json(item, depth + 1, side_files)?);
                }
                JsonValue::Array(out)
            }
            Value::Map(map) => {
                let wrapped = map.keys().any(|key| key.starts_with(TAG_PREFIX));
                let inner = if wrapped { depth + 2 } else { depth + 1 };
                limits.check_depth(inner)?;
                let mut out = Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.to_json(item, inner, side_files)?);
                }
                if wrapped {
                    tagged(TAG_MAP, JsonValue::Object(out))
                } else {
                    JsonValue::Object(out)
                }
            }
            Value::Record(record) => self.encode_record(record, depth, side_files)?,
        };
        Ok(json)
    }

    fn encode_record(
        &self,
        record: &Record,
        depth: usize,
        side_files: &mut Vec<String>,
    ) -> Result<JsonValue> {
        if let Some(handler) = self.session.get(&record.type_name) {
            let mut out = HandlerRecord::new(&record.type_name, handler.mode());
            handler.flatten(record, &mut out)?;
            let (fields, owned) = out.into_parts();
            debug!(
                type_name = %record.type_name,
                mode = handler.mode(),
                side_files = owned.len(),
                "record flattened by handler"
            );
            side_files.extend(owned);
            let json = JsonValue::Object(fields);
            self.options.limits.check_depth(depth + json_depth(&json))?;
            return Ok(json);
        }

        // {"ice/record": .., "ice/fields": {..}} opens two levels
        self.options.limits.check_depth(depth + 2)?;
        let mut fields = Map::new();
        for (name, item) in &record.fields {
            fields.insert(name.clone(), self.to_json(item, depth + 2, side_files)?);
        }
        let mut out = Map::new();
        out.insert(
            TAG_RECORD.to_string(),
            JsonValue::String(record.type_name.clone()),
        );
        out.insert(TAG_FIELDS.to_string(), JsonValue::Object(fields));
        Ok(JsonValue::Object(out))
    }
}

fn tagged(tag: &str, value: JsonValue) -> JsonValue {
    let mut out = Map::new();
    out.insert(tag.to_string(), value);
    JsonValue::Object(out)
}

fn encode_float(f: f64) -> JsonValue {
    match Number::from_f64(f) {
        Some(n) => JsonValue::Number(n),
        None => {
            let name = if f.is_nan() {
                "nan"
            } else if f.is_sign_positive() {
                "inf"
            } else {
                "-inf"
            };
            tagged(TAG_FLOAT, JsonValue::from(name))
        }
    }
}

/// Serialize JSON with the archive's four-space indentation
pub fn to_pretty_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(PRETTY_INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| IceError::Internal(format!("non UTF-8 JSON output: {}", e)))
}
