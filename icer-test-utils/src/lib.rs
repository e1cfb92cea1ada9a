//! icer Test Utilities
//!
//! Shared builders, fixtures and assertions for the icer test suites.

use std::collections::BTreeMap;
use std::path::Path;

use icer_format::Value;
use walkdir::WalkDir;

/// Builder for map values with common field patterns
#[derive(Debug, Default)]
pub struct ValueBuilder {
    fields: BTreeMap<String, Value>,
}

impl ValueBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string field
    pub fn string(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), Value::from(value));
        self
    }

    /// Add an integer field
    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.fields.insert(key.to_string(), Value::Int(value));
        self
    }

    /// Add a float field
    pub fn float(mut self, key: &str, value: f64) -> Self {
        self.fields.insert(key.to_string(), Value::Float(value));
        self
    }

    /// Add a boolean field
    pub fn bool(mut self, key: &str, value: bool) -> Self {
        self.fields.insert(key.to_string(), Value::Bool(value));
        self
    }

    /// Add a null field
    pub fn null(mut self, key: &str) -> Self {
        self.fields.insert(key.to_string(), Value::Null);
        self
    }

    /// Add a bytes field
    pub fn bytes(mut self, key: &str, value: &[u8]) -> Self {
        self.fields.insert(key.to_string(), Value::Bytes(value.to_vec()));
        self
    }

    /// Add a field holding any value
    pub fn value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Build the map value
    pub fn build(self) -> Value {
        Value::Map(self.fields)
    }
}

/// Generate test values with various patterns
pub struct TestDataGenerator;

impl TestDataGenerator {
    /// One value of every scalar kind
    pub fn primitives() -> Vec<(&'static str, Value)> {
        vec![
            ("null", Value::Null),
            ("yes", Value::Bool(true)),
            ("answer", Value::Int(42)),
            ("ratio", Value::Float(0.25)),
            ("name", Value::from("icer")),
            ("blob", Value::Bytes(vec![0, 1, 2, 254, 255])),
        ]
    }

    /// Maps and sequences nested `depth` levels deep
    pub fn nested(depth: usize) -> Value {
        let mut value = Value::from("leaf");
        for i in 0..depth {
            value = ValueBuilder::new()
                .int("level", i as i64)
                .value("items", vec![Value::Int(i as i64), value.clone()])
                .value("child", value)
                .build();
        }
        value
    }

    /// Maps whose keys collide with the envelope tag prefix
    pub fn tag_like_keys() -> Value {
        ValueBuilder::new()
            .string("ice/record", "not a record")
            .int("ice/handler", 1)
            .string("plain", "value")
            .build()
    }

    /// Floats that have no plain JSON form
    pub fn special_floats() -> Vec<f64> {
        vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.5, -1024.0]
    }

    /// Strings with multi-byte and escaped characters
    pub fn unicode_strings() -> Vec<&'static str> {
        vec![
            "Hello, World!",
            "Hello, 世界! 🌍",
            "ASCII + 中文 + العربية",
            "quote \" backslash \\ newline \n tab \t",
            "",
        ]
    }

    /// Integer boundary values
    pub fn boundary_ints() -> Vec<i64> {
        vec![i64::MIN, -1, 0, 1, i64::MAX]
    }

    /// A ramp of `count` floats, exact in binary
    pub fn float_ramp(count: usize) -> Vec<f64> {
        (0..count).map(|i| i as f64 * 0.5 - 8.0).collect()
    }

    /// A ramp of `count` integers
    pub fn int_ramp(count: usize) -> Vec<i64> {
        (0..count as i64).map(|i| i * 3 - 7).collect()
    }
}

/// Files under `dir`, relative and sorted; directories are not listed
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

/// Utility functions for test assertions
pub mod assertions {
    use icer_format::Value;

    /// Structural equality that treats NaN as equal to NaN
    pub fn values_match(actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::Seq(a), Value::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && values_match(va, vb))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.type_name == b.type_name
                    && a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(&b.fields)
                        .all(|((ka, va), (kb, vb))| ka == kb && values_match(va, vb))
            }
            _ => actual == expected,
        }
    }

    /// Assert that two values match, treating NaN as equal to NaN
    pub fn assert_values_match(actual: &Value, expected: &Value, context: &str) {
        if !values_match(actual, expected) {
            panic!(
                "value assertion failed in {}:\nExpected: {:?}\nActual: {:?}",
                context, expected, actual
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::values_match;
    use super::*;

    #[test]
    fn test_value_builder() {
        let value = ValueBuilder::new()
            .string("name", "test")
            .int("age", 25)
            .bool("active", true)
            .build();

        assert_eq!(value.get("name").and_then(Value::as_str), Some("test"));
        assert_eq!(value.get("age").and_then(Value::as_i64), Some(25));
        assert_eq!(value.get("active").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_nested_depth() {
        let mut value = &TestDataGenerator::nested(5);
        let mut depth = 0;
        while let Some(child) = value.get("child") {
            value = child;
            depth += 1;
        }
        assert_eq!(depth, 5);
        assert_eq!(value.as_str(), Some("leaf"));
    }

    #[test]
    fn test_nan_matches_nan() {
        let a = Value::Seq(vec![Value::Float(f64::NAN), Value::Int(1)]);
        assert!(values_match(&a, &a.clone()));
        assert!(!values_match(&a, &Value::Seq(vec![Value::Float(0.0), Value::Int(1)])));
    }
}
