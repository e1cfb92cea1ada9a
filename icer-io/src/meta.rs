//! Archive metadata record
//!
//! Every `ice` call writes a `meta` entry describing when and with what the
//! archive was written. Caller-supplied fields are merged over the defaults.

use chrono::{DateTime, Local};
use icer_codec::{to_pretty_string, HandlerMetadata, HandlerRegistry};
use icer_format::constants::META_KEY;
use icer_format::{IceError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::archive::Archive;

/// Placeholder environment manifest: `name==version` of the writing crates
pub fn environment_manifest() -> Vec<String> {
    vec![
        format!("{}=={}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        format!("icer-codec=={}", env!("CARGO_PKG_VERSION")),
        format!("icer-format=={}", env!("CARGO_PKG_VERSION")),
    ]
}

/// The `meta` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Environment manifest
    #[serde(default)]
    pub manifest: Vec<String>,
    /// Local date, `YYYY-MM-DD`
    #[serde(default)]
    pub datestr: String,
    /// Local time, `HH:MM:SS`
    #[serde(default)]
    pub timestr: String,
    /// Handlers registered when the archive was written
    #[serde(default)]
    pub handlers: Vec<HandlerMetadata>,
    /// Caller-supplied fields
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Metadata {
    /// Metadata stamped with the current local time
    pub fn now(handlers: &HandlerRegistry) -> Self {
        Self::at(Local::now(), handlers)
    }

    /// Metadata stamped with `when`
    pub fn at(when: DateTime<Local>, handlers: &HandlerRegistry) -> Self {
        Self {
            manifest: environment_manifest(),
            datestr: when.format("%Y-%m-%d").to_string(),
            timestr: when.format("%H:%M:%S").to_string(),
            handlers: handlers.list(),
            extra: Map::new(),
        }
    }

    /// Build the JSON record, caller fields winning over defaults
    pub fn to_json(&self, user: Option<&Map<String, JsonValue>>) -> Result<Map<String, JsonValue>> {
        let mut out = match serde_json::to_value(self)? {
            JsonValue::Object(map) => map,
            _ => return Err(IceError::Internal("metadata is not an object".to_string())),
        };
        if let Some(user) = user {
            for (key, value) in user {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(out)
    }

    /// A caller field
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.extra.get(key)
    }
}

/// Render a metadata record as entry text
pub(crate) fn encode_meta(record: &Map<String, JsonValue>, pretty: bool) -> Result<String> {
    if pretty {
        to_pretty_string(record)
    } else {
        Ok(serde_json::to_string(record)?)
    }
}

/// Read and parse the `meta` entry of `archive`
pub fn read_meta(archive: &dyn Archive) -> Result<Metadata> {
    let text = archive.read(META_KEY)?;
    Ok(serde_json::from_str(&text)?)
}

/// Read the `meta` entry as raw JSON
pub fn read_meta_json(archive: &dyn Archive) -> Result<JsonValue> {
    let text = archive.read(META_KEY)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn dates_are_zero_padded() {
        let when = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        let meta = Metadata::at(when, &HandlerRegistry::new());
        assert_eq!(meta.datestr, "2024-03-07");
        assert_eq!(meta.timestr, "09:05:01");
    }

    #[test]
    fn user_fields_override_defaults() {
        let meta = Metadata::now(&HandlerRegistry::new());
        let user = json!({"datestr": "yesterday", "run": 7});
        let out = meta.to_json(user.as_object()).unwrap();
        assert_eq!(out["datestr"], json!("yesterday"));
        assert_eq!(out["run"], json!(7));
        assert!(out["manifest"].as_array().unwrap()[0]
            .as_str()
            .unwrap()
            .starts_with("icer-io=="));
    }

    #[test]
    fn parses_back_with_extra_fields() {
        let meta = Metadata::now(&HandlerRegistry::new());
        let user = json!({"project": "demo"});
        let text = serde_json::to_string(&meta.to_json(user.as_object()).unwrap()).unwrap();
        let parsed: Metadata = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.get("project"), Some(&json!("demo")));
        assert_eq!(parsed.datestr, meta.datestr);
    }
}
