//! Tree decoder: JSON record text to [`Value`]

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use icer_format::constants::{
    TAG_BYTES, TAG_FIELDS, TAG_FLOAT, TAG_HANDLER, TAG_MAP, TAG_PREFIX, TAG_RECORD,
};
use icer_format::limits::json_depth;
use icer_format::{IceError, Limits, Record, Result, Value};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::handler::HandlerRecord;
use crate::registry::HandlerSession;
use crate::revive::Revivers;

/// Decodes record text against a handler session
pub struct Decoder<'s> {
    session: &'s HandlerSession,
    revivers: Option<&'s Revivers>,
    limits: Limits,
}

impl<'s> Decoder<'s> {
    /// Create a decoder with default limits and no revivers
    pub fn new(session: &'s HandlerSession) -> Self {
        Self {
            session,
            revivers: None,
            limits: Limits::default(),
        }
    }

    /// Apply `revivers` to records decoded without a handler
    pub fn with_revivers(mut self, revivers: Option<&'s Revivers>) -> Self {
        self.revivers = revivers;
        self
    }

    /// Replace the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Decode record text
    pub fn decode_str(&self, text: &str) -> Result<Value> {
        self.limits.check_record_len(text.len())?;
        let json: JsonValue = serde_json::from_str(text)?;
        self.decode_json(json)
    }

    /// Decode an already parsed JSON value
    pub fn decode_json(&self, json: JsonValue) -> Result<Value> {
        self.from_json(json, 0)
    }

    /// Decode `json`, which sits inside `depth` enclosing JSON containers
    fn from_json(&self, json: JsonValue, depth: usize) -> Result<Value> {
        let value = match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(items) => {
                self.limits.check_depth(depth + 1)?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.from_json(item, depth + 1)?);
                }
                Value::Seq(out)
            }
            JsonValue::Object(map) => {
                self.limits.check_depth(depth + 1)?;
                self.decode_object(map, depth)?
            }
        };
        Ok(value)
    }

    fn decode_object(&self, mut map: Map<String, JsonValue>, depth: usize) -> Result<Value> {
        let known = [TAG_HANDLER, TAG_RECORD, TAG_BYTES, TAG_FLOAT, TAG_MAP];
        let tag = match known.iter().find(|t| map.contains_key(**t)) {
            Some(tag) => tag.to_string(),
            None => match map.keys().find(|k| k.starts_with(TAG_PREFIX)) {
                Some(unknown) => {
                    return Err(IceError::UnrecognizedValue {
                        tag: unknown.clone(),
                    })
                }
                None => return self.decode_map(map, depth),
            },
        };

        match tag.as_str() {
            TAG_HANDLER => {
                let inner = map.values().map(json_depth).max().unwrap_or(0);
                self.limits.check_depth(depth + 1 + inner)?;
                self.decode_handler(map)
            }
            TAG_RECORD => {
                let type_name = match map.remove(TAG_RECORD) {
                    Some(JsonValue::String(name)) => name,
                    _ => return Err(IceError::invalid_record("record type is not a string")),
                };
                let fields = match map.remove(TAG_FIELDS) {
                    Some(JsonValue::Object(fields)) => fields,
                    None => Map::new(),
                    Some(_) => {
                        return Err(IceError::invalid_record(format!(
                            "fields of record '{}' are not an object",
                            type_name
                        )))
                    }
                };
                self.limits.check_depth(depth + 2)?;
                let mut record = Record::new(type_name);
                for (name, item) in fields {
                    let item = self.from_json(item, depth + 2)?;
                    record.fields.insert(name, item);
                }
                match self.revivers {
                    Some(revivers) => revivers.revive(record),
                    None => Ok(Value::Record(record)),
                }
            }
            TAG_BYTES => match only_tag(map, TAG_BYTES)? {
                JsonValue::String(encoded) => BASE64
                    .decode(encoded.as_bytes())
                    .map(Value::Bytes)
                    .map_err(|e| IceError::invalid_record(format!("bad base64 payload: {}", e))),
                _ => Err(IceError::invalid_record("bytes payload is not a string")),
            },
            TAG_FLOAT => match only_tag(map, TAG_FLOAT)? {
                JsonValue::String(name) => match name.as_str() {
                    "nan" => Ok(Value::Float(f64::NAN)),
                    "inf" => Ok(Value::Float(f64::INFINITY)),
                    "-inf" => Ok(Value::Float(f64::NEG_INFINITY)),
                    other => Err(IceError::invalid_record(format!(
                        "unknown float name '{}'",
                        other
                    ))),
                },
                _ => Err(IceError::invalid_record("float payload is not a string")),
            },
            TAG_MAP => match only_tag(map, TAG_MAP)? {
                JsonValue::Object(inner) => {
                    self.limits.check_depth(depth + 2)?;
                    self.decode_map(inner, depth + 1)
                }
                _ => Err(IceError::invalid_record("wrapped map is not an object")),
            },
            _ => Err(IceError::UnrecognizedValue { tag }),
        }
    }

    fn decode_map(&self, map: Map<String, JsonValue>, depth: usize) -> Result<Value> {
        let mut out = BTreeMap::new();
        for (key, item) in map {
            out.insert(key, self.from_json(item, depth + 1)?);
        }
        Ok(Value::Map(out))
    }

    fn decode_handler(&self, map: Map<String, JsonValue>) -> Result<Value> {
        let record = HandlerRecord::from_json(map)?;
        let handler =
            self.session
                .get(record.type_name())
                .ok_or_else(|| IceError::UnrecognizedValue {
                    tag: record.type_name().to_string(),
                })?;
        debug!(
            type_name = record.type_name(),
            mode = record.mode(),
            "restoring record through handler"
        );
        handler.restore(&record)
    }
}

fn only_tag(mut map: Map<String, JsonValue>, tag: &str) -> Result<JsonValue> {
    if map.len() != 1 {
        return Err(IceError::invalid_record(format!(
            "'{}' envelope carries extra keys",
            tag
        )));
    }
    map.remove(tag)
        .ok_or_else(|| IceError::Internal(format!("'{}' vanished from envelope", tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> Result<Value> {
        let session = HandlerSession::empty();
        let decoder = Decoder::new(&session);
        decoder.decode_str(text)
    }

    #[test]
    fn numbers_keep_int_float_distinction() {
        assert_eq!(decode("42").unwrap(), Value::Int(42));
        assert_eq!(decode("42.0").unwrap(), Value::Float(42.0));
        assert_eq!(decode("-7").unwrap(), Value::Int(-7));
    }

    #[test]
    fn tagged_scalars() {
        assert_eq!(
            decode(r#"{"ice/bytes": "aGk="}"#).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
        assert_eq!(
            decode(r#"{"ice/float": "inf"}"#).unwrap(),
            Value::Float(f64::INFINITY)
        );
        assert!(decode(r#"{"ice/float": "nan"}"#)
            .unwrap()
            .as_f64()
            .unwrap()
            .is_nan());
    }

    #[test]
    fn generic_records() {
        let value = decode(r#"{"ice/record": "point", "ice/fields": {"x": 1}}"#).unwrap();
        assert_eq!(value, Value::from(Record::new("point").with("x", 1)));
    }

    #[test]
    fn wrapped_maps_unwrap() {
        let value = decode(r#"{"ice/map": {"ice/record": 1}}"#).unwrap();
        assert_eq!(value.get("ice/record"), Some(&Value::Int(1)));
    }

    #[test]
    fn unknown_tags_are_unrecognized() {
        match decode(r#"{"ice/frobnicate": 1}"#) {
            Err(IceError::UnrecognizedValue { tag }) => assert_eq!(tag, "ice/frobnicate"),
            other => panic!("expected UnrecognizedValue, got {:?}", other),
        }
    }

    #[test]
    fn handler_records_without_handler_are_unrecognized() {
        match decode(r#"{"ice/handler": "ndarray", "mode": "txt", "file_uuid": "a.txt"}"#) {
            Err(IceError::UnrecognizedValue { tag }) => assert_eq!(tag, "ndarray"),
            other => panic!("expected UnrecognizedValue, got {:?}", other),
        }
    }

    #[test]
    fn revivers_apply_to_generic_records() {
        let mut revivers = Revivers::new();
        revivers.alias("OldPoint", "Point");
        let session = HandlerSession::empty();
        let decoder = Decoder::new(&session).with_revivers(Some(&revivers));
        let value = decoder
            .decode_str(r#"{"ice/record": "OldPoint", "ice/fields": {}}"#)
            .unwrap();
        assert_eq!(value.as_record().unwrap().type_name, "Point");
    }

    #[test]
    fn record_length_limit() {
        let session = HandlerSession::empty();
        let decoder = Decoder::new(&session).with_limits(Limits {
            max_record_bytes: 4,
            ..Limits::default()
        });
        assert!(matches!(
            decoder.decode_str("[1, 2, 3]"),
            Err(IceError::LimitExceeded(_))
        ));
    }

    #[test]
    fn depth_counts_json_levels() {
        let session = HandlerSession::empty();
        let decoder = Decoder::new(&session).with_limits(Limits {
            max_depth: 4,
            ..Limits::default()
        });
        assert!(decoder.decode_str("[[[[1]]]]").is_ok());
        assert!(matches!(
            decoder.decode_str("[[[[[1]]]]]"),
            Err(IceError::LimitExceeded(_))
        ));

        let two = r#"{"ice/record": "n", "ice/fields": {"c": {"ice/record": "n", "ice/fields": {}}}}"#;
        assert!(decoder.decode_str(two).is_ok());
        let three = r#"[{"ice/record": "n", "ice/fields": {"c": {"ice/record": "n", "ice/fields": {}}}}]"#;
        assert!(matches!(decoder.decode_str(three), Err(IceError::LimitExceeded(_))));
    }
}
