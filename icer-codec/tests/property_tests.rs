//! Property-based round-trip tests for the tree codec

use std::collections::BTreeMap;

use icer_codec::{Decoder, Encoder, HandlerSession, Record, Value};
use proptest::prelude::*;

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1_000_000i64..1_000_000).prop_map(|i| Value::Float(i as f64 / 8.0)),
        "[a-z ]{0,12}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ]
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Seq),
            prop::collection::btree_map("(ice/)?[a-z]{1,6}", inner.clone(), 0..6)
                .prop_map(Value::Map),
            (
                "[A-Z][a-z]{0,6}",
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
            )
                .prop_map(|(type_name, fields): (String, BTreeMap<String, Value>)| {
                    Value::Record(Record { type_name, fields })
                }),
        ]
    })
}

proptest! {
    #[test]
    fn encode_decode_roundtrip(value in arb_value()) {
        let session = HandlerSession::empty();
        let encoded = Encoder::new(&session).encode(&value).unwrap();
        prop_assert!(encoded.side_files.is_empty());
        let decoded = Decoder::new(&session).decode_str(&encoded.text).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn decoder_never_panics_on_arbitrary_json(text in "\\PC{0,64}") {
        let session = HandlerSession::empty();
        let _ = Decoder::new(&session).decode_str(&text);
    }
}
