use super::*;
use crate::types::Field;
use crate::types::Header;
use crate::types::KeyField;
use crate::types::Timestamp;
use crate::types::Value;
use crate::types::skey;

fn sortable(ty: ValueType, value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_sortable(ty, value, &mut buf).unwrap();
    buf
}

fn opaque(ty: ValueType, value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_opaque(ty, value, &mut buf).unwrap();
    buf
}

fn three_string_header() -> Header {
    Header::new(
        "scans",
        vec![
            KeyField::new("k1", ValueType::String),
            KeyField::new("k2", ValueType::String),
            KeyField::new("k3", ValueType::String),
        ],
        vec![Field::new("n", ValueType::Int)],
    )
}

// =============================================================================
// Sortable Scalars
// =============================================================================

#[test]
fn test_string_layout() {
    assert_eq!(sortable(ValueType::String, &"foo".into()), b"foo\x00\x00");
    assert_eq!(sortable(ValueType::String, &"".into()), b"\x00\x00");
}

#[test]
fn test_bytes_null_escaped() {
    let encoded = sortable(ValueType::Bytes, &Value::Bytes(b"b\x00r".to_vec()));
    assert_eq!(encoded, b"b\x00\xFFr\x00\x00");

    let (value, consumed) = decode_sortable(ValueType::Bytes, &encoded, 0).unwrap();
    assert_eq!(value, Value::Bytes(b"b\x00r".to_vec()));
    assert_eq!(consumed, encoded.len());
}

#[test]
fn test_bytes_literal_ff_needs_no_escape() {
    let encoded = sortable(ValueType::Bytes, &Value::Bytes(vec![0xFF, 0xFF]));
    assert_eq!(encoded, vec![0xFF, 0xFF, 0x00, 0x00]);
}

#[test]
fn test_string_prefix_sorts_first() {
    let a = sortable(ValueType::String, &"a".into());
    let a_null = sortable(ValueType::String, &"a\0".into());
    let aa = sortable(ValueType::String, &"aa".into());
    let b = sortable(ValueType::String, &"b".into());
    assert!(a < a_null);
    assert!(a_null < aa);
    assert!(aa < b);
}

#[test]
fn test_int_layout_and_order() {
    assert_eq!(sortable(ValueType::Int, &Value::Int(0)), vec![0x80, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(sortable(ValueType::Int, &Value::Int(-1)), vec![0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

    let values = [i64::MIN, -42, -1, 0, 1, 42, i64::MAX];
    let encoded: Vec<_> = values.iter().map(|&n| sortable(ValueType::Int, &Value::Int(n))).collect();
    assert!(encoded.windows(2).all(|w| w[0] < w[1]));

    for (n, bytes) in values.iter().zip(&encoded) {
        let (value, consumed) = decode_sortable(ValueType::Int, bytes, 0).unwrap();
        assert_eq!(value, Value::Int(*n), "failed for n={}", n);
        assert_eq!(consumed, 8);
    }
}

#[test]
fn test_uint_big_endian() {
    assert_eq!(sortable(ValueType::UInt, &Value::UInt(42)), vec![0, 0, 0, 0, 0, 0, 0, 42]);
    assert!(sortable(ValueType::UInt, &Value::UInt(255)) < sortable(ValueType::UInt, &Value::UInt(256)));
}

#[test]
fn test_bool_layout() {
    assert_eq!(sortable(ValueType::Bool, &Value::Bool(false)), vec![0x00]);
    assert_eq!(sortable(ValueType::Bool, &Value::Bool(true)), vec![0x01]);
}

#[test]
fn test_time_before_epoch_sorts_first() {
    let before = Value::Time(Timestamp::from_nanos(-1));
    let epoch = Value::Time(Timestamp::EPOCH);
    let after = Value::Time(Timestamp::from_unix(123, 456).unwrap());
    assert!(sortable(ValueType::Time, &before) < sortable(ValueType::Time, &epoch));
    assert!(sortable(ValueType::Time, &epoch) < sortable(ValueType::Time, &after));

    let bytes = sortable(ValueType::Time, &after);
    assert_eq!(decode_sortable(ValueType::Time, &bytes, 0).unwrap().0, after);
}

#[test]
fn test_float_not_sortable() {
    let mut buf = Vec::new();
    let err = encode_sortable(ValueType::Float, &Value::Float(1.5), &mut buf).unwrap_err();
    assert!(matches!(err, CodecError::NotSortable { .. }));
    assert!(buf.is_empty());
}

#[test]
fn test_sortable_type_mismatch() {
    let mut buf = Vec::new();
    let err = encode_sortable(ValueType::String, &Value::Int(1), &mut buf).unwrap_err();
    assert!(matches!(
        err,
        CodecError::TypeMismatch {
            expected: ValueType::String,
            found: ValueType::Int,
            ..
        }
    ));
}

// =============================================================================
// Malformed Sortable Input
// =============================================================================

#[test]
fn test_missing_terminator() {
    let err = decode_sortable(ValueType::String, b"abc", 0).unwrap_err();
    assert!(matches!(err, CodecError::MissingTerminator { offset: 0 }));

    // A lone trailing null is not a terminator.
    let err = decode_sortable(ValueType::String, b"abc\x00", 0).unwrap_err();
    assert!(matches!(err, CodecError::MissingTerminator { .. }));
}

#[test]
fn test_invalid_escape() {
    let err = decode_sortable(ValueType::Bytes, b"a\x00\x01\x00\x00", 0).unwrap_err();
    assert!(matches!(err, CodecError::InvalidEscape { byte: 0x01, offset: 2 }));
}

#[test]
fn test_invalid_utf8() {
    let err = decode_sortable(ValueType::String, b"\xC3\x28\x00\x00", 0).unwrap_err();
    assert!(matches!(err, CodecError::InvalidUtf8 { .. }));
}

#[test]
fn test_truncated_fixed_width() {
    let err = decode_sortable(ValueType::Int, &[0x80, 0, 0], 0).unwrap_err();
    assert!(matches!(err, CodecError::UnexpectedEnd { offset: 0 }));

    let err = decode_sortable(ValueType::Bool, &[], 0).unwrap_err();
    assert!(matches!(err, CodecError::UnexpectedEnd { offset: 0 }));
}

#[test]
fn test_invalid_bool() {
    let err = decode_sortable(ValueType::Bool, &[0x02], 0).unwrap_err();
    assert!(matches!(err, CodecError::InvalidBool { byte: 0x02, offset: 0 }));
}

// =============================================================================
// Opaque Scalars
// =============================================================================

#[test]
fn test_opaque_layout() {
    assert_eq!(opaque(ValueType::String, &"hi".into()), vec![0x01, 0, 0, 0, 2, b'h', b'i']);
    assert_eq!(opaque(ValueType::Bool, &Value::Bool(true)), vec![0x05, 0x01]);
}

#[test]
fn test_opaque_roundtrip_all_types() {
    let values = [
        Value::from("foo"),
        Value::Bytes(b"b\x00r".to_vec()),
        Value::Int(-42),
        Value::UInt(42),
        Value::Bool(false),
        Value::Time(Timestamp::from_unix(123, 456).unwrap()),
        Value::Float(-0.25),
    ];
    for value in values {
        let ty = value.value_type();
        let bytes = opaque(ty, &value);
        let (decoded, consumed) = decode_opaque(ty, &bytes, 0).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(consumed, bytes.len());
    }
}

#[test]
fn test_opaque_wrong_tag() {
    let bytes = opaque(ValueType::Int, &Value::Int(7));
    let err = decode_opaque(ValueType::UInt, &bytes, 0).unwrap_err();
    assert!(matches!(
        err,
        CodecError::TypeMismatch {
            expected: ValueType::UInt,
            found: ValueType::Int,
            offset: 0
        }
    ));

    let err = decode_opaque(ValueType::Int, &[0x42], 0).unwrap_err();
    assert!(matches!(err, CodecError::UnknownTypeTag { tag: 0x42, offset: 0 }));
}

#[test]
fn test_opaque_length_past_end() {
    let err = decode_opaque(ValueType::Bytes, &[0x02, 0, 0, 0, 9, 1, 2], 0).unwrap_err();
    assert!(matches!(err, CodecError::LengthOverflow { len: 9, offset: 1 }));
}

// =============================================================================
// Composite Keys
// =============================================================================

#[test]
fn test_key_roundtrip() {
    let header = three_string_header();
    let key = skey(&["a", "b\0c", ""]);
    let bytes = encode_key(&header, &key).unwrap();
    assert_eq!(decode_key(&header, &bytes).unwrap(), key);
}

#[test]
fn test_key_shifted_boundaries_order() {
    let header = three_string_header();
    let a = encode_key(&header, &skey(&["a", "aa", "b"])).unwrap();
    let b = encode_key(&header, &skey(&["a", "a", "ab"])).unwrap();
    assert!(b < a);
    assert!(!a.starts_with(&b) && !b.starts_with(&a));
}

#[test]
fn test_key_order_matches_scan_scenario() {
    let header = three_string_header();
    let mut rows = vec![
        (skey(&["a", "a", "a"]), 1),
        (skey(&["b", "b", "b"]), 2),
        (skey(&["a", "aa", "b"]), 3),
        (skey(&["a", "ba", "c"]), 4),
        (skey(&["a", "a", "ab"]), 5),
        (skey(&["a", "b", "c"]), 6),
    ];
    rows.sort_by_key(|(key, _)| encode_key(&header, key).unwrap());
    let order: Vec<i32> = rows.into_iter().map(|(_, n)| n).collect();
    assert_eq!(order, vec![1, 5, 3, 6, 4, 2]);
}

#[test]
fn test_key_mixed_types() {
    let header = Header::new(
        "mixed",
        vec![
            KeyField::new("s", ValueType::String),
            KeyField::new("b", ValueType::Bytes),
            KeyField::new("i", ValueType::Int),
            KeyField::new("u", ValueType::UInt),
            KeyField::new("f", ValueType::Bool),
            KeyField::new("t", ValueType::Time),
        ],
        vec![],
    );
    let key = vec![
        Value::from("foo"),
        Value::Bytes(b"b\x00r".to_vec()),
        Value::Int(-42),
        Value::UInt(42),
        Value::Bool(false),
        Value::Time(Timestamp::from_unix(123, 456).unwrap()),
    ];
    let bytes = encode_key(&header, &key).unwrap();
    assert_eq!(decode_key(&header, &bytes).unwrap(), key);
}

#[test]
fn test_key_field_count() {
    let header = three_string_header();
    let err = encode_key(&header, &skey(&["a", "b"])).unwrap_err();
    assert!(matches!(err, CodecError::FieldCount { expected: 3, found: 2 }));
}

#[test]
fn test_decode_key_trailing_bytes() {
    let header = three_string_header();
    let mut bytes = encode_key(&header, &skey(&["a", "b", "c"])).unwrap();
    bytes.push(0x7A);
    let err = decode_key(&header, &bytes).unwrap_err();
    assert!(matches!(err, CodecError::TrailingBytes { remaining: 1, .. }));
}

#[test]
fn test_decode_key_at_offset() {
    let header = three_string_header();
    let key = skey(&["x", "y", "z"]);
    let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 7];
    encode_key_into(&header, &key, &mut bytes).unwrap();
    let (decoded, end) = decode_key_at(&header, &bytes, 8).unwrap();
    assert_eq!(decoded, key);
    assert_eq!(end, bytes.len());
}

// =============================================================================
// Prefixes and Ranges
// =============================================================================

#[test]
fn test_prefix_is_byte_prefix_of_key() {
    let header = three_string_header();
    let full = encode_key(&header, &skey(&["a", "aa", "b"])).unwrap();
    let a = Value::from("a");
    let aa = Value::from("aa");

    let p1 = encode_prefix(&header, &[&a], PrefixMatch::Exact).unwrap();
    let p2 = encode_prefix(&header, &[&a, &aa], PrefixMatch::Exact).unwrap();
    assert!(full.starts_with(&p1));
    assert!(full.starts_with(&p2));
    assert!(encode_prefix(&header, &[], PrefixMatch::Open).unwrap().is_empty());
}

#[test]
fn test_prefix_does_not_match_longer_field() {
    let header = three_string_header();
    let a = Value::from("a");
    let range = KeyRange::prefix(encode_prefix(&header, &[&a, &a], PrefixMatch::Exact).unwrap());

    let aa_row = encode_key(&header, &skey(&["a", "aa", "b"])).unwrap();
    let a_row = encode_key(&header, &skey(&["a", "a", "ab"])).unwrap();
    assert!(range.contains(&a_row));
    assert!(!range.contains(&aa_row));
}

#[test]
fn test_open_prefix_matches_longer_field() {
    let header = three_string_header();
    let a = Value::from("a");
    let range = KeyRange::prefix(encode_prefix(&header, &[&a, &a], PrefixMatch::Open).unwrap());

    let aa_row = encode_key(&header, &skey(&["a", "aa", "b"])).unwrap();
    let a_row = encode_key(&header, &skey(&["a", "a", "ab"])).unwrap();
    let b_row = encode_key(&header, &skey(&["a", "b", "c"])).unwrap();
    assert!(range.contains(&a_row));
    assert!(range.contains(&aa_row));
    assert!(!range.contains(&b_row));
}

#[test]
fn test_open_prefix_keeps_escapes() {
    let header = three_string_header();
    let a_nul = Value::from("a\0");
    let open = encode_prefix(&header, &[&a_nul], PrefixMatch::Open).unwrap();
    assert_eq!(open, b"a\x00\xff");

    let range = KeyRange::prefix(open);
    let inside = encode_key(&header, &skey(&["a\0b", "x", "y"])).unwrap();
    let outside = encode_key(&header, &skey(&["a", "x", "y"])).unwrap();
    assert!(range.contains(&inside));
    assert!(!range.contains(&outside));
}

#[test]
fn test_open_prefix_on_fixed_width_is_exact() {
    let header = Header::new("ints", vec![KeyField::new("n", ValueType::Int)], vec![]);
    let n = Value::Int(7);
    assert_eq!(
        encode_prefix(&header, &[&n], PrefixMatch::Open).unwrap(),
        encode_prefix(&header, &[&n], PrefixMatch::Exact).unwrap()
    );
}

#[test]
fn test_prefix_match_of() {
    assert_eq!(PrefixMatch::of(&[]), PrefixMatch::Exact);
    assert_eq!(PrefixMatch::of(&[Some(Value::from("a"))]), PrefixMatch::Open);
    assert_eq!(PrefixMatch::of(&[Some(Value::from("a")), None]), PrefixMatch::Exact);
}

#[test]
fn test_strinc() {
    let mut data = b"abc".to_vec();
    assert!(strinc(&mut data));
    assert_eq!(data, b"abd");

    let mut data = vec![0x01, 0xFF];
    assert!(strinc(&mut data));
    assert_eq!(data, vec![0x02]);

    let mut data = vec![0xFF, 0xFF];
    assert!(!strinc(&mut data));

    let mut data = Vec::new();
    assert!(!strinc(&mut data));
}

#[test]
fn test_range_unbounded_when_all_ff() {
    let range = KeyRange::prefix(vec![0xFF]);
    assert_eq!(range.end, None);
    assert!(range.contains(&[0xFF, 0x00]));
    assert!(!range.contains(&[0xFE]));
}

#[test]
fn test_range_excludes_successor() {
    let range = KeyRange::prefix(vec![0x01, 0xFF]);
    assert_eq!(range.end.as_deref(), Some(&[0x02][..]));
    assert!(range.contains(&[0x01, 0xFF, 0xFF, 0xFF]));
    assert!(!range.contains(&[0x02]));
}

// =============================================================================
// Payloads
// =============================================================================

#[test]
fn test_payload_roundtrip() {
    let header = Header::new(
        "payload",
        vec![KeyField::new("k", ValueType::String)],
        vec![
            Field::new("s", ValueType::String),
            Field::new("f", ValueType::Float),
            Field::new("t", ValueType::Time),
        ],
    );
    let data = vec![Value::from("x\0y"), Value::Float(3.5), Value::Time(Timestamp::from_nanos(-5))];
    let bytes = encode_payload(&header, &data).unwrap();
    assert_eq!(decode_payload(&header, &bytes).unwrap(), data);
}

#[test]
fn test_payload_empty() {
    let header = Header::new("empty", vec![KeyField::new("k", ValueType::String)], vec![]);
    assert!(encode_payload(&header, &[]).unwrap().is_empty());
    assert!(decode_payload(&header, &[]).unwrap().is_empty());
}

#[test]
fn test_payload_trailing_and_truncated() {
    let header = three_string_header();
    let mut bytes = encode_payload(&header, &[Value::Int(1)]).unwrap();

    bytes.push(0);
    assert!(matches!(decode_payload(&header, &bytes), Err(CodecError::TrailingBytes { .. })));

    bytes.truncate(4);
    assert!(matches!(decode_payload(&header, &bytes), Err(CodecError::UnexpectedEnd { .. })));
}
