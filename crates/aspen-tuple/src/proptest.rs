//! Property-based tests for the key and payload codecs.
//!
//! Invariants checked:
//!
//! 1. **Roundtrip**: decode(encode(k)) == k for keys and payloads
//! 2. **Scalar order**: byte order of one encoded value equals natural order
//! 3. **Composite order**: byte order of encoded keys is lexicographic by field
//! 4. **Unambiguity**: distinct keys never share an encoding
//! 5. **Range capture**: a prefix range holds exactly the keys with that prefix,
//!    with the last value matched exactly or as a content prefix

use std::cmp::Ordering;

use proptest::prelude::*;

use crate::codec::KeyRange;
use crate::codec::PrefixMatch;
use crate::codec::decode_key;
use crate::codec::decode_payload;
use crate::codec::encode_key;
use crate::codec::encode_payload;
use crate::codec::encode_prefix;
use crate::codec::encode_sortable;
use crate::types::Field;
use crate::types::Header;
use crate::types::KeyField;
use crate::types::Timestamp;
use crate::types::Value;
use crate::types::ValueType;

// =============================================================================
// Strategies
// =============================================================================

fn arb_key_type() -> impl Strategy<Value = ValueType> {
    prop_oneof![
        Just(ValueType::String),
        Just(ValueType::Bytes),
        Just(ValueType::Int),
        Just(ValueType::UInt),
        Just(ValueType::Bool),
        Just(ValueType::Time),
    ]
}

fn arb_any_type() -> impl Strategy<Value = ValueType> {
    prop_oneof![arb_key_type(), Just(ValueType::Float)]
}

/// Values of one type, biased towards the bytes that stress the escaping.
fn arb_value(ty: ValueType) -> BoxedStrategy<Value> {
    match ty {
        ValueType::String => prop_oneof![
            "[a-c]{0,4}".prop_map(Value::String),
            "[a\\x00\\x01]{0,4}".prop_map(Value::String),
            ".{0,12}".prop_map(Value::String),
        ]
        .boxed(),
        ValueType::Bytes => prop_oneof![
            prop::collection::vec(prop::sample::select(vec![0x00u8, 0x01, 0xFE, 0xFF]), 0..6),
            prop::collection::vec(any::<u8>(), 0..16),
        ]
        .prop_map(Value::Bytes)
        .boxed(),
        ValueType::Int => prop_oneof![(-3i64..3), any::<i64>()].prop_map(Value::Int).boxed(),
        ValueType::UInt => prop_oneof![(0u64..3), any::<u64>()].prop_map(Value::UInt).boxed(),
        ValueType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ValueType::Time => any::<i64>().prop_map(|n| Value::Time(Timestamp::from_nanos(n))).boxed(),
        ValueType::Float => (-1e100f64..1e100f64).prop_map(Value::Float).boxed(),
    }
}

fn key_header(types: &[ValueType]) -> Header {
    let key = types.iter().enumerate().map(|(i, ty)| KeyField::new(format!("k{i}"), *ty)).collect();
    Header::new("t", key, Vec::new())
}

fn data_header(types: &[ValueType]) -> Header {
    let data = types.iter().enumerate().map(|(i, ty)| Field::new(format!("d{i}"), *ty)).collect();
    Header::new("t", vec![KeyField::new("id", ValueType::Int)], data)
}

fn arb_values(types: &[ValueType]) -> Vec<BoxedStrategy<Value>> {
    types.iter().map(|ty| arb_value(*ty)).collect()
}

/// A key shape and one key of that shape.
fn arb_key() -> impl Strategy<Value = (Vec<ValueType>, Vec<Value>)> {
    prop::collection::vec(arb_key_type(), 1..4).prop_flat_map(|types| {
        let values = arb_values(&types);
        (Just(types), values)
    })
}

/// A key shape and two keys of that shape.
fn arb_key_pair() -> impl Strategy<Value = (Vec<ValueType>, Vec<Value>, Vec<Value>)> {
    prop::collection::vec(arb_key_type(), 1..4).prop_flat_map(|types| {
        let a = arb_values(&types);
        let b = arb_values(&types);
        (Just(types), a, b)
    })
}

fn arb_same_type_pair() -> impl Strategy<Value = (ValueType, Value, Value)> {
    arb_key_type().prop_flat_map(|ty| (Just(ty), arb_value(ty), arb_value(ty)))
}

fn lexicographic(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp_sortable(y) {
            Some(Ordering::Equal) => {}
            Some(order) => return order,
            None => panic!("values of different types in one key position"),
        }
    }
    a.len().cmp(&b.len())
}

/// Whether a stored field matches an open prefix value.
fn starts_with(field: &Value, prefix: &Value) -> bool {
    match (field, prefix) {
        (Value::String(f), Value::String(p)) => f.as_bytes().starts_with(p.as_bytes()),
        (Value::Bytes(f), Value::Bytes(p)) => f.starts_with(p),
        _ => field == prefix,
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Decoding an encoded key yields the original key.
    #[test]
    fn prop_key_roundtrip((types, key) in arb_key()) {
        let header = key_header(&types);
        let encoded = encode_key(&header, &key).expect("encode");
        let decoded = decode_key(&header, &encoded).expect("decode");
        prop_assert_eq!(decoded, key);
    }

    /// Decoding an encoded payload yields the original payload.
    #[test]
    fn prop_payload_roundtrip(
        (types, data) in prop::collection::vec(arb_any_type(), 0..5)
            .prop_flat_map(|types| { let values = arb_values(&types); (Just(types), values) })
    ) {
        let header = data_header(&types);
        let encoded = encode_payload(&header, &data).expect("encode");
        let decoded = decode_payload(&header, &encoded).expect("decode");
        prop_assert_eq!(decoded, data);
    }

    /// One encoded value compares like the value itself.
    #[test]
    fn prop_scalar_order((ty, a, b) in arb_same_type_pair()) {
        let mut ea = Vec::new();
        let mut eb = Vec::new();
        encode_sortable(ty, &a, &mut ea).expect("encode a");
        encode_sortable(ty, &b, &mut eb).expect("encode b");
        let expected = a.cmp_sortable(&b).expect("same type");
        prop_assert_eq!(ea.cmp(&eb), expected, "{} vs {}", a, b);
    }

    /// Encoded keys compare lexicographically by field.
    #[test]
    fn prop_composite_order((types, a, b) in arb_key_pair()) {
        let header = key_header(&types);
        let ea = encode_key(&header, &a).expect("encode a");
        let eb = encode_key(&header, &b).expect("encode b");
        prop_assert_eq!(ea.cmp(&eb), lexicographic(&a, &b));
    }

    /// Distinct keys have distinct encodings.
    #[test]
    fn prop_unambiguous((types, a, b) in arb_key_pair()) {
        let header = key_header(&types);
        let ea = encode_key(&header, &a).expect("encode a");
        let eb = encode_key(&header, &b).expect("encode b");
        prop_assert_eq!(ea == eb, a == b);
    }

    /// A prefix range contains a key iff the key starts with the prefix.
    #[test]
    fn prop_range_capture((types, a, b) in arb_key_pair(), len in 0usize..4) {
        let header = key_header(&types);
        let len = len.min(types.len());
        let explicit: Vec<&Value> = a[..len].iter().collect();
        let range = KeyRange::prefix(encode_prefix(&header, &explicit, PrefixMatch::Exact).expect("prefix"));

        let ea = encode_key(&header, &a).expect("encode a");
        let eb = encode_key(&header, &b).expect("encode b");
        prop_assert!(range.contains(&ea));
        prop_assert_eq!(range.contains(&eb), a[..len] == b[..len]);
    }

    /// An open prefix range contains a key iff the leading values are equal
    /// and the last stored field starts with the last prefix value.
    #[test]
    fn prop_open_range_capture((types, a, b) in arb_key_pair(), len in 1usize..4, cut in 0usize..4) {
        let header = key_header(&types);
        let len = len.min(types.len());
        let last = match &a[len - 1] {
            Value::String(s) => {
                let mut end = cut.min(s.len());
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                Value::String(s[..end].to_string())
            }
            Value::Bytes(bytes) => Value::Bytes(bytes[..cut.min(bytes.len())].to_vec()),
            other => other.clone(),
        };
        let mut explicit: Vec<&Value> = a[..len - 1].iter().collect();
        explicit.push(&last);
        let range = KeyRange::prefix(encode_prefix(&header, &explicit, PrefixMatch::Open).expect("prefix"));

        let ea = encode_key(&header, &a).expect("encode a");
        let eb = encode_key(&header, &b).expect("encode b");
        prop_assert!(range.contains(&ea));
        let expected = a[..len - 1] == b[..len - 1] && starts_with(&b[len - 1], &last);
        prop_assert_eq!(range.contains(&eb), expected);
    }
}
