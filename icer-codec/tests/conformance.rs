//! Conformance tests for the entry envelope and handler interception

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use icer_codec::{
    new_side_file_name, Decoder, EncodeOptions, Encoder, HandlerProvider, HandlerRecord,
    HandlerRegistry, HandlerSession, IceError, Record, Result, SideFileSink, SideFileStore,
    SideFileWriter, StoreKind, TypeHandler, Value,
};
use serde_json::json;

#[derive(Debug, Default)]
struct TestStore {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

struct TestSink {
    name: String,
    buf: Vec<u8>,
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Write for TestSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SideFileSink for TestSink {
    fn commit(self: Box<Self>) -> Result<()> {
        self.files.lock().unwrap().insert(self.name, self.buf);
        Ok(())
    }
}

impl SideFileStore for TestStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(name))
    }

    fn open_read(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let files = self.files.lock().unwrap();
        let data = files.get(name).cloned().ok_or_else(|| IceError::SideFileNotFound {
            name: name.to_string(),
        })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, name: &str) -> Result<SideFileWriter> {
        Ok(SideFileWriter::new(
            name,
            Box::new(TestSink {
                name: name.to_string(),
                buf: Vec::new(),
                files: Arc::clone(&self.files),
            }),
        ))
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.lock().unwrap().keys().cloned().collect())
    }

    fn local_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Stores the `data` bytes field of `blob` records as a side file ("raw")
/// or inline as a number list ("inline").
struct BlobHandler {
    mode: &'static str,
    store: Arc<dyn SideFileStore>,
}

impl TypeHandler for BlobHandler {
    fn type_name(&self) -> &str {
        "blob"
    }

    fn mode(&self) -> &str {
        self.mode
    }

    fn flatten(&self, value: &Record, record: &mut HandlerRecord) -> Result<()> {
        let data = value.field("data")?.as_bytes().unwrap_or_default().to_vec();
        match self.mode {
            "raw" => {
                let name = new_side_file_name("raw");
                self.store.write_all(&name, &data)?;
                record.attach_side_file(name);
            }
            _ => record.insert_serialized("data", &data)?,
        }
        Ok(())
    }

    fn restore(&self, record: &HandlerRecord) -> Result<Value> {
        let data = match record.mode() {
            "raw" => self.store.read_to_vec(record.side_file()?)?,
            _ => record.field::<Vec<u8>>("data")?,
        };
        Ok(Record::new("blob").with("data", Value::Bytes(data)).into())
    }
}

struct BlobProvider {
    mode: &'static str,
}

impl HandlerProvider for BlobProvider {
    fn type_name(&self) -> &str {
        "blob"
    }

    fn mode(&self) -> &str {
        self.mode
    }

    fn bind(&self, store: Arc<dyn SideFileStore>) -> Result<Box<dyn TypeHandler>> {
        Ok(Box::new(BlobHandler {
            mode: self.mode,
            store,
        }))
    }
}

fn session_with(mode: &'static str, store: &Arc<TestStore>) -> HandlerSession {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(BlobProvider { mode }));
    registry
        .open_session(Arc::clone(store) as Arc<dyn SideFileStore>)
        .expect("session")
}

fn blob(bytes: &[u8]) -> Value {
    Record::new("blob")
        .with("data", Value::Bytes(bytes.to_vec()))
        .into()
}

#[test]
fn handler_record_envelope_shape() {
    let store = Arc::new(TestStore::default());
    let session = session_with("raw", &store);
    let encoded = Encoder::new(&session).encode(&blob(b"payload")).unwrap();

    assert_eq!(encoded.side_files.len(), 1);
    let json: serde_json::Value = serde_json::from_str(&encoded.text).unwrap();
    assert_eq!(json["ice/handler"], json!("blob"));
    assert_eq!(json["mode"], json!("raw"));
    assert_eq!(json["file_uuid"], json!(encoded.side_files[0]));
    assert_eq!(
        store.files.lock().unwrap().get(&encoded.side_files[0]).unwrap(),
        b"payload"
    );
}

#[test]
fn handler_fires_inside_nested_values() {
    let store = Arc::new(TestStore::default());
    let session = session_with("raw", &store);
    let value: Value = vec![
        ("first", blob(b"a")),
        ("rest", Value::Seq(vec![blob(b"b"), Value::from(3)])),
    ]
    .into_iter()
    .collect();

    let encoded = Encoder::new(&session).encode(&value).unwrap();
    assert_eq!(encoded.side_files.len(), 2);
    assert_ne!(encoded.side_files[0], encoded.side_files[1]);

    let decoded = Decoder::new(&session).decode_str(&encoded.text).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn restore_uses_the_stored_mode() {
    let store = Arc::new(TestStore::default());
    let writer_session = session_with("raw", &store);
    let encoded = Encoder::new(&writer_session).encode(&blob(b"xyz")).unwrap();
    drop(writer_session);

    let reader_session = session_with("inline", &store);
    let decoded = Decoder::new(&reader_session)
        .decode_str(&encoded.text)
        .unwrap();
    assert_eq!(decoded, blob(b"xyz"));
}

#[test]
fn inline_mode_writes_no_side_files() {
    let store = Arc::new(TestStore::default());
    let session = session_with("inline", &store);
    let encoded = Encoder::new(&session)
        .with_options(EncodeOptions {
            pretty: false,
            ..EncodeOptions::default()
        })
        .encode(&blob(&[1, 2]))
        .unwrap();
    assert!(encoded.side_files.is_empty());
    assert!(store.files.lock().unwrap().is_empty());
    assert_eq!(
        encoded.text,
        r#"{"data":[1,2],"ice/handler":"blob","mode":"inline"}"#
    );
}

#[test]
fn records_encoded_without_handler_need_no_handler_to_decode() {
    let empty = HandlerSession::empty();
    let encoded = Encoder::new(&empty).encode(&blob(b"q")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&encoded.text).unwrap();
    assert_eq!(json["ice/record"], json!("blob"));
    assert_eq!(json["ice/fields"]["data"], json!({"ice/bytes": "cQ=="}));

    let decoded = Decoder::new(&empty).decode_str(&encoded.text).unwrap();
    assert_eq!(decoded, blob(b"q"));
}

#[test]
fn missing_side_file_surfaces_not_found() {
    let store = Arc::new(TestStore::default());
    let session = session_with("raw", &store);
    let encoded = Encoder::new(&session).encode(&blob(b"gone")).unwrap();
    store.remove(&encoded.side_files[0]).unwrap();

    let err = Decoder::new(&session).decode_str(&encoded.text).unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[test]
fn handler_records_require_a_mode() {
    let store = Arc::new(TestStore::default());
    let session = session_with("raw", &store);
    let err = Decoder::new(&session)
        .decode_str(r#"{"ice/handler": "blob"}"#)
        .unwrap_err();
    assert!(matches!(err, IceError::InvalidRecord(_)));
}

#[test]
fn tag_envelopes_reject_extra_keys() {
    let empty = HandlerSession::empty();
    let err = Decoder::new(&empty)
        .decode_str(r#"{"ice/bytes": "aGk=", "other": 1}"#)
        .unwrap_err();
    assert!(matches!(err, IceError::InvalidRecord(_)));
}
