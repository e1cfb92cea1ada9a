//! Entry and side-file bookkeeping shared by every archive kind

use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;

use icer_codec::{HandlerProvider, HandlerRegistry, SideFileStore, SideFileWriter};
use icer_format::constants::{ENTRY_SUFFIX, FIELD_FILE_UUID, OWNERSHIP_SUFFIX};
use icer_format::{validate_name, IceError, OpenMode, Result};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::options::ArchiveOptions;

/// Entries, side files and handlers over one store
#[derive(Debug)]
pub struct Container {
    store: Arc<dyn SideFileStore>,
    mode: OpenMode,
    handlers: HandlerRegistry,
    options: ArchiveOptions,
}

fn entry_file(name: &str) -> String {
    format!("{}.{}", name, ENTRY_SUFFIX)
}

fn manifest_file(name: &str) -> String {
    format!("{}.{}", name, OWNERSHIP_SUFFIX)
}

impl Container {
    /// Container over `store`, opened in `mode`
    pub fn new(store: Arc<dyn SideFileStore>, mode: OpenMode, options: ArchiveOptions) -> Self {
        Self {
            store,
            mode,
            handlers: HandlerRegistry::new(),
            options,
        }
    }

    /// Mode the archive was opened in
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Options the archive was opened with
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// The store holding entries and side files
    pub fn store(&self) -> Arc<dyn SideFileStore> {
        Arc::clone(&self.store)
    }

    /// Handler registry
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Mutable handler registry
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// Register a handler provider (last write wins)
    pub fn register(&mut self, provider: Arc<dyn HandlerProvider>) {
        self.handlers.register(provider);
    }

    pub(crate) fn ensure_writable(&self, operation: impl Into<String>) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(IceError::read_only(operation))
        }
    }

    /// Write `<name>.json`, replacing any previous text
    pub fn save(&self, name: &str, text: &str) -> Result<()> {
        self.ensure_writable(format!("save '{}'", name))?;
        validate_name(name)?;
        self.store.write_all(&entry_file(name), text.as_bytes())
    }

    /// Write `<name>.json` and record which side files it owns
    pub fn save_owned(&self, name: &str, text: &str, side_files: &[String]) -> Result<()> {
        self.save(name, text)?;
        let manifest = manifest_file(name);
        if side_files.is_empty() {
            if self.store.exists(&manifest)? {
                self.store.remove(&manifest)?;
            }
        } else {
            let json = serde_json::to_vec(side_files)?;
            self.store.write_all(&manifest, &json)?;
        }
        Ok(())
    }

    /// Text of `<name>.json`
    pub fn read(&self, name: &str) -> Result<String> {
        validate_name(name)?;
        self.store
            .read_to_string(&entry_file(name))
            .map_err(|e| match e {
                IceError::SideFileNotFound { .. } => IceError::KeyNotFound {
                    key: name.to_string(),
                },
                other => other,
            })
    }

    /// Names of every entry, `meta` included
    pub fn keys(&self) -> Result<BTreeSet<String>> {
        let suffix = format!(".{}", ENTRY_SUFFIX);
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter_map(|file| {
                file.strip_suffix(suffix.as_str())
                    .filter(|stem| !stem.is_empty())
                    .map(str::to_string)
            })
            .collect())
    }

    /// Whether `<name>.json` exists
    pub fn contains(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        self.store.exists(&entry_file(name))
    }

    /// Names of every stored file that is neither an entry nor a manifest
    pub fn side_file_names(&self) -> Result<Vec<String>> {
        let entry = format!(".{}", ENTRY_SUFFIX);
        let manifest = format!(".{}", OWNERSHIP_SUFFIX);
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|file| !file.ends_with(&entry) && !file.ends_with(&manifest))
            .collect())
    }

    /// Side files owned by entry `name`
    pub fn owned_side_files(&self, name: &str) -> Result<Vec<String>> {
        validate_name(name)?;
        let manifest = manifest_file(name);
        if self.store.exists(&manifest)? {
            let names: Vec<String> = serde_json::from_slice(&self.store.read_to_vec(&manifest)?)?;
            return Ok(names
                .into_iter()
                .filter(|side| match validate_name(side) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(entry = name, side_file = %side, error = %e, "skipping invalid side-file name");
                        false
                    }
                })
                .collect());
        }

        let text = self.read(name)?;
        let json: JsonValue = serde_json::from_str(&text)?;
        let mut found = Vec::new();
        collect_file_uuids(&json, &mut found);
        found.retain(|side| validate_name(side).is_ok());
        if !found.is_empty() {
            warn!(
                entry = name,
                side_files = found.len(),
                "entry has no ownership manifest, using file_uuid fields"
            );
        }
        Ok(found)
    }

    /// Delete entry `name`, its side files and its manifest
    pub fn remove(&self, name: &str) -> Result<()> {
        self.ensure_writable(format!("remove '{}'", name))?;
        if !self.contains(name)? {
            return Err(IceError::KeyNotFound {
                key: name.to_string(),
            });
        }

        let owned = self.owned_side_files(name)?;
        for side in &owned {
            if self.store.exists(side)? {
                self.store.remove(side)?;
            } else {
                debug!(entry = name, side_file = %side, "owned side file already gone");
            }
        }

        let manifest = manifest_file(name);
        if self.store.exists(&manifest)? {
            self.store.remove(&manifest)?;
        }
        self.store.remove(&entry_file(name))?;
        debug!(entry = name, side_files = owned.len(), "entry removed");
        Ok(())
    }

    /// Open side file `name` for reading
    pub fn open_side_file(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        self.store.open_read(name)
    }

    /// Open side file `name` for an atomic write
    pub fn create_side_file(&self, name: &str) -> Result<SideFileWriter> {
        self.ensure_writable(format!("write side file '{}'", name))?;
        self.store.open_write(name)
    }
}

fn collect_file_uuids(json: &JsonValue, out: &mut Vec<String>) {
    match json {
        JsonValue::Object(map) => {
            for (key, value) in map {
                match (key.as_str(), value) {
                    (FIELD_FILE_UUID, JsonValue::String(name)) => {
                        if !out.contains(name) {
                            out.push(name.clone());
                        }
                    }
                    _ => collect_file_uuids(value, out),
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_file_uuids(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn container(mode: OpenMode) -> (MemoryStore, Container) {
        let store = MemoryStore::new(mode.is_writable());
        let container = Container::new(Arc::new(store.clone()), mode, ArchiveOptions::default());
        (store, container)
    }

    #[test]
    fn save_read_keys() {
        let (_, c) = container(OpenMode::Write);
        c.save("a", "1").unwrap();
        c.save("b", "2").unwrap();
        assert_eq!(c.read("a").unwrap(), "1");
        assert_eq!(
            c.keys().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(matches!(c.read("z"), Err(IceError::KeyNotFound { .. })));
    }

    #[test]
    fn remove_deletes_owned_side_files() {
        let (store, c) = container(OpenMode::Write);
        store.write_all("s1.bin", &[1]).unwrap();
        store.write_all("other.bin", &[2]).unwrap();
        c.save_owned("a", "{}", &["s1.bin".to_string()]).unwrap();

        c.remove("a").unwrap();
        assert_eq!(store.list().unwrap(), vec!["other.bin"]);
        assert!(matches!(c.remove("a"), Err(IceError::KeyNotFound { .. })));
    }

    #[test]
    fn legacy_entries_scan_file_uuid() {
        let (store, c) = container(OpenMode::Write);
        store.write_all("x.txt", b"1").unwrap();
        store.write_all("y.npy", b"2").unwrap();
        c.save(
            "a",
            r#"{"outer": {"ice/handler": "ndarray", "mode": "txt", "file_uuid": "x.txt"},
                "list": [{"file_uuid": "y.npy"}, {"file_uuid": "../etc"}]}"#,
        )
        .unwrap();

        assert_eq!(c.owned_side_files("a").unwrap(), vec!["y.npy", "x.txt"]);
        c.remove("a").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn read_only_container_refuses_mutation() {
        let (store, _) = container(OpenMode::Write);
        store.write_all("a.json", b"1").unwrap();
        let c = Container::new(
            Arc::new(store.reopen(false)),
            OpenMode::Read,
            ArchiveOptions::default(),
        );
        assert!(matches!(c.save("b", "1"), Err(IceError::ReadOnly { .. })));
        assert!(matches!(c.remove("a"), Err(IceError::ReadOnly { .. })));
        assert!(c.contains("a").unwrap());
    }

    #[test]
    fn side_file_names_exclude_entries_and_manifests() {
        let (store, c) = container(OpenMode::Write);
        store.write_all("s.bin", &[1]).unwrap();
        c.save_owned("a", "{}", &["s.bin".to_string()]).unwrap();
        assert_eq!(c.side_file_names().unwrap(), vec!["s.bin"]);
    }
}
