//! Decoder limits

/// Deepest JSON nesting `serde_json` parses back (its parser stops at 128)
pub const JSON_DEPTH_CEILING: usize = 127;

/// Limits applied while encoding and decoding entry records
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum JSON nesting depth of a record, envelopes included
    /// (default: 100, capped at [`JSON_DEPTH_CEILING`])
    pub max_depth: usize,
    /// Maximum size of one entry's record text (default: 256 MiB)
    pub max_record_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_record_bytes: 256 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Depth actually enforced
    pub fn effective_depth(&self) -> usize {
        self.max_depth.min(JSON_DEPTH_CEILING)
    }

    /// Check that `depth` levels of JSON nesting are still within bounds
    pub fn check_depth(&self, depth: usize) -> crate::Result<()> {
        if depth > self.effective_depth() {
            return Err(crate::IceError::LimitExceeded(format!(
                "nesting depth {} exceeds {}",
                depth,
                self.effective_depth()
            )));
        }
        Ok(())
    }

    /// Check that a record of `len` bytes may be decoded
    pub fn check_record_len(&self, len: usize) -> crate::Result<()> {
        if len > self.max_record_bytes {
            return Err(crate::IceError::LimitExceeded(format!(
                "record of {} bytes exceeds {} bytes",
                len, self.max_record_bytes
            )));
        }
        Ok(())
    }
}

/// JSON nesting depth of `json`; scalars are 0, `[]` and `{}` are 1
pub fn json_depth(json: &serde_json::Value) -> usize {
    match json {
        serde_json::Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        serde_json::Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}
