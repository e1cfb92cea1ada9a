//! Negative tests covering the `IceError` variants surfaced by archives

use std::fs;

use icer_io::plugins::{ArrayMode, NdArray, Table};
use icer_io::{
    deice, ice, register_builtin, Archive, ArchiveOptions, BuiltinModes, DirArchive, EncodeOptions,
    IceError, Limits, MemoryArchive, MemoryStore, OpenMode, Record, Value, ZipArchive,
};
use icer_test_utils::{list_files, TestDataGenerator};
use tempfile::TempDir;

fn dir_archive(tmp: &TempDir, modes: &BuiltinModes) -> DirArchive {
    let mut archive = DirArchive::open(tmp.path().join("a.ice"), OpenMode::Write).unwrap();
    register_builtin(archive.handlers_mut(), modes);
    archive
}

fn array() -> Value {
    NdArray::from_i64(&[4], vec![1, 2, 3, 4]).unwrap().into()
}

#[test]
fn invalid_entry_names() {
    let archive = MemoryArchive::new();
    for name in ["", "a/b", ".hidden", "..", "a\\b"] {
        let err = ice(&archive, None, [(name, Value::Null)]).unwrap_err();
        assert!(matches!(err, IceError::InvalidName { .. }), "{name:?}: {err}");
    }
    let err = ice(&archive, None, [("meta", Value::Null)]).unwrap_err();
    assert!(matches!(err, IceError::ReservedName { .. }));
}

#[test]
fn missing_keys() {
    let archive = MemoryArchive::new();
    ice(&archive, None, [("a", Value::from(1))]).unwrap();
    assert!(matches!(archive.read("b"), Err(IceError::KeyNotFound { .. })));
    assert!(matches!(archive.remove("b"), Err(IceError::KeyNotFound { .. })));
    assert!(matches!(
        deice(&archive, Some(&["a", "b"][..]), None),
        Err(IceError::KeyNotFound { .. })
    ));
}

#[test]
fn tampered_side_file_fails_checksum() {
    let tmp = TempDir::new().unwrap();
    let archive = dir_archive(&tmp, &BuiltinModes::default());
    ice(&archive, None, [("x", array())]).unwrap();

    let side = archive.container().owned_side_files("x").unwrap();
    assert_eq!(side.len(), 1);
    let path = archive.root().join(&side[0]);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, bytes).unwrap();

    let err = deice(&archive, None, None).unwrap_err();
    assert!(matches!(err, IceError::ChecksumMismatch { .. }), "{err}");
}

#[test]
fn deleted_side_file_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let archive = dir_archive(&tmp, &BuiltinModes::default());
    ice(&archive, None, [("x", array())]).unwrap();
    let side = archive.container().owned_side_files("x").unwrap();
    fs::remove_file(archive.root().join(&side[0])).unwrap();

    let err = deice(&archive, None, None).unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(matches!(err, IceError::SideFileNotFound { .. }));

    // Removing the entry still succeeds with its side file already gone.
    archive.remove("x").unwrap();
}

#[test]
fn corrupt_entry_text() {
    let archive = MemoryArchive::new();
    archive.save("broken", "{\"unterminated\": ").unwrap();
    assert!(matches!(
        deice(&archive, Some(&["broken"][..]), None),
        Err(IceError::Json(_))
    ));

    archive.save("tagged", r#"{"ice/unknown": 1}"#).unwrap();
    let err = deice(&archive, Some(&["tagged"][..]), None).unwrap_err();
    assert!(matches!(err, IceError::UnrecognizedValue { ref tag } if tag == "ice/unknown"), "{err}");
}

#[test]
fn mismatched_record_shape_is_invalid() {
    let mut archive = MemoryArchive::new();
    register_builtin(archive.handlers_mut(), &BuiltinModes::default());
    let err = ice(&archive, None, [("t", Value::from(Record::new("table")))]).unwrap_err();
    assert!(matches!(err, IceError::InvalidRecord(_)), "{err}");

    let table = Table::default().to_record().with("columns", 7);
    let err = ice(&archive, None, [("t", Value::from(table))]).unwrap_err();
    assert!(matches!(err, IceError::InvalidRecord(_)), "{err}");
}

#[test]
fn unknown_stored_mode_is_a_config_error() {
    let mut archive = MemoryArchive::new();
    register_builtin(archive.handlers_mut(), &BuiltinModes::default());
    archive
        .save(
            "x",
            r#"{"ice/handler": "ndarray", "mode": "hdf5", "dtype": "f64", "shape": [0]}"#,
        )
        .unwrap();
    let err = deice(&archive, None, None).unwrap_err();
    assert!(matches!(err, IceError::HandlerConfig { .. }), "{err}");
}

#[test]
fn depth_limit_applies_to_ice_and_deice() {
    let shallow = ArchiveOptions {
        encode: EncodeOptions {
            limits: Limits {
                max_depth: 3,
                ..Limits::default()
            },
            ..EncodeOptions::default()
        },
        ..ArchiveOptions::default()
    };

    let store = MemoryStore::new(true);
    let archive = MemoryArchive::open_with(&store, OpenMode::Write, shallow.clone()).unwrap();
    let err = ice(&archive, None, [("deep", TestDataGenerator::nested(4))]).unwrap_err();
    assert!(matches!(err, IceError::LimitExceeded(_)), "{err}");

    let roomy = MemoryArchive::open(&store, OpenMode::Write).unwrap();
    ice(&roomy, None, [("deep", TestDataGenerator::nested(4))]).unwrap();
    let reader = MemoryArchive::open_with(&store, OpenMode::Read, shallow).unwrap();
    let err = deice(&reader, None, None).unwrap_err();
    assert!(matches!(err, IceError::LimitExceeded(_)), "{err}");
}

fn nested_records(levels: usize) -> Value {
    let mut value = Value::from(7);
    for _ in 0..levels {
        value = Record::new("node").with("child", value).into();
    }
    value
}

fn nested_seqs(levels: usize) -> Value {
    let mut value = Value::from(7);
    for _ in 0..levels {
        value = Value::Seq(vec![value]);
    }
    value
}

#[test]
fn values_at_the_default_depth_limit_read_back() {
    let max = Limits::default().max_depth;
    let archive = MemoryArchive::new();

    // Each generic record envelope opens two JSON levels.
    let records = nested_records(max / 2);
    let seqs = nested_seqs(max);
    ice(
        &archive,
        None,
        [("records", records.clone()), ("seqs", seqs.clone())],
    )
    .unwrap();
    let values = deice(&archive, None, None).unwrap();
    assert_eq!(values["records"], records);
    assert_eq!(values["seqs"], seqs);

    for (name, value) in [
        ("deeper_records", nested_records(max / 2 + 1)),
        ("deeper_seqs", nested_seqs(max + 1)),
    ] {
        let err = ice(&archive, None, [(name, value)]).unwrap_err();
        assert!(matches!(err, IceError::LimitExceeded(_)), "{name}: {err}");
        assert!(!archive.contains(name).unwrap(), "{name}");
    }
}

#[test]
fn depth_limit_is_capped_at_what_can_be_parsed() {
    let unbounded = ArchiveOptions {
        encode: EncodeOptions {
            limits: Limits {
                max_depth: 10_000,
                ..Limits::default()
            },
            ..EncodeOptions::default()
        },
        ..ArchiveOptions::default()
    };
    let store = MemoryStore::new(true);
    let archive = MemoryArchive::open_with(&store, OpenMode::Write, unbounded).unwrap();
    let err = ice(&archive, None, [("deep", nested_seqs(200))]).unwrap_err();
    assert!(matches!(err, IceError::LimitExceeded(_)), "{err}");

    ice(&archive, None, [("edge", nested_seqs(127))]).unwrap();
    let values = deice(&archive, None, None).unwrap();
    assert_eq!(values["edge"], nested_seqs(127));
}

#[test]
fn failed_ice_leaves_earlier_entries() {
    let tmp = TempDir::new().unwrap();
    let archive = dir_archive(&tmp, &BuiltinModes::default());
    let err = ice(
        &archive,
        None,
        [
            ("first", array()),
            ("bad/name", Value::Null),
            ("never", Value::Null),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, IceError::InvalidName { .. }));

    let keys = archive.keys().unwrap();
    assert!(keys.contains("first"));
    assert!(!keys.contains("never"));
    let files = list_files(archive.root());
    assert!(files.iter().all(|f| !f.starts_with('.')), "{files:?}");
}

#[test]
fn create_refuses_existing_archives() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("a.ice");
    DirArchive::open(&dir, OpenMode::Create).unwrap();
    assert!(matches!(
        DirArchive::open(&dir, OpenMode::Create),
        Err(IceError::AlreadyExists { .. })
    ));

    let zip = tmp.path().join("a.ice.zip");
    ZipArchive::open(&zip, OpenMode::Write).unwrap().close().unwrap();
    assert!(matches!(
        ZipArchive::open(&zip, OpenMode::Create),
        Err(IceError::AlreadyExists { .. })
    ));

    let archive = MemoryArchive::new();
    ice(&archive, None, [("a", Value::from(1))]).unwrap();
    assert!(matches!(
        MemoryArchive::open(archive.store(), OpenMode::Create),
        Err(IceError::AlreadyExists { .. })
    ));
}

#[test]
fn garbage_zip_is_a_container_error() {
    let tmp = TempDir::new().unwrap();
    let zip = tmp.path().join("junk.ice.zip");
    fs::write(&zip, b"definitely not a zip file").unwrap();
    let err = ZipArchive::open(&zip, OpenMode::Read).unwrap_err();
    assert!(matches!(err, IceError::Container(_)), "{err}");
}

#[test]
fn unknown_mode_names_are_rejected() {
    let err = "parquet".parse::<ArrayMode>().unwrap_err();
    assert!(matches!(err, IceError::HandlerConfig { ref handler, .. } if handler == "ndarray"));
    assert!("zip".parse::<OpenMode>().is_err());
}
