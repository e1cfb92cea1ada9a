//! Record revivers
//!
//! A record written without a handler comes back from the decoder as a
//! generic [`Record`]. Revivers let a `deice` caller turn such records into
//! something else: normalize them, fill defaults, or rename the type when an
//! archive was written under an older type name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use icer_format::{Record, Result, Value};

/// Turns a generically decoded record into a value
pub trait RecordReviver: Send + Sync {
    /// Revive `record`
    fn revive(&self, record: Record) -> Result<Value>;
}

impl<F> RecordReviver for F
where
    F: Fn(Record) -> Result<Value> + Send + Sync,
{
    fn revive(&self, record: Record) -> Result<Value> {
        self(record)
    }
}

#[derive(Clone)]
enum Revival {
    Function(Arc<dyn RecordReviver>),
    Alias(String),
}

/// Map from record type name to reviver
#[derive(Clone, Default)]
pub struct Revivers {
    entries: BTreeMap<String, Revival>,
}

impl Revivers {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Revive records of `type_name` with `reviver`
    pub fn insert<R>(&mut self, type_name: impl Into<String>, reviver: R) -> &mut Self
    where
        R: RecordReviver + 'static,
    {
        self.entries
            .insert(type_name.into(), Revival::Function(Arc::new(reviver)));
        self
    }

    /// Rename records of `from` to `to`, then revive them as `to` if a
    /// reviver exists for it
    pub fn alias(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.entries.insert(from.into(), Revival::Alias(to.into()));
        self
    }

    /// Whether a reviver or alias exists for `type_name`
    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply the reviver registered for the record's type, if any.
    ///
    /// Alias chains are followed up to the number of entries, so a cycle
    /// terminates with the record renamed to wherever the walk stopped.
    pub fn revive(&self, mut record: Record) -> Result<Value> {
        for _ in 0..=self.entries.len() {
            match self.entries.get(&record.type_name) {
                None => return Ok(Value::Record(record)),
                Some(Revival::Function(reviver)) => return reviver.revive(record),
                Some(Revival::Alias(target)) => record.type_name = target.clone(),
            }
        }
        Ok(Value::Record(record))
    }
}

impl fmt::Debug for Revivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, revival) in &self.entries {
            match revival {
                Revival::Function(_) => map.entry(name, &"<fn>"),
                Revival::Alias(target) => map.entry(name, target),
            };
        }
        map.finish()
    }
}
