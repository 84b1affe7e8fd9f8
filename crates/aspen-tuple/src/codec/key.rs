//! Composite keys and prefix ranges.

use super::CodecError;
use super::CodecResult;
use super::scalar::decode_sortable;
use super::scalar::encode_sortable;
use super::scalar::encode_sortable_open;
use crate::types::Header;
use crate::types::Key;
use crate::types::Value;

// =============================================================================
// Composite Keys
// =============================================================================

/// Encode a full key in header order.
///
/// The fields are concatenated with no separator. Each field is
/// self-delimiting and order-preserving, so the result compares exactly like
/// the field-wise comparison of the key.
pub fn encode_key(header: &Header, key: &[Value]) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(key.len() * 10);
    encode_key_into(header, key, &mut buf)?;
    Ok(buf)
}

/// Encode a full key into an existing buffer.
pub fn encode_key_into(header: &Header, key: &[Value], buf: &mut Vec<u8>) -> CodecResult<()> {
    if key.len() != header.key.len() {
        return Err(CodecError::FieldCount {
            expected: header.key.len(),
            found: key.len(),
        });
    }
    for (field, value) in header.key.iter().zip(key) {
        encode_sortable(field.value_type, value, buf)?;
    }
    Ok(())
}

/// How the last explicit value of a scan prefix is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMatch {
    /// Every explicit value must equal the stored field.
    Exact,
    /// The last explicit value matches any stored field whose content starts
    /// with it. Only differs from `Exact` for string and byte fields.
    Open,
}

impl PrefixMatch {
    /// `Open` when the prefix ends in an explicit value, `Exact` when it ends
    /// in a wildcard or is empty.
    pub fn of(prefix: &[Option<Value>]) -> Self {
        match prefix.last() {
            Some(Some(_)) => PrefixMatch::Open,
            _ => PrefixMatch::Exact,
        }
    }
}

/// Encode the explicit leading values of a partial key.
///
/// The result is a byte prefix of the encoding of every full key that starts
/// with these values, as matched by `mode`.
pub fn encode_prefix(header: &Header, values: &[&Value], mode: PrefixMatch) -> CodecResult<Vec<u8>> {
    if values.len() > header.key.len() {
        return Err(CodecError::FieldCount {
            expected: header.key.len(),
            found: values.len(),
        });
    }
    let mut buf = Vec::new();
    let last = values.len().saturating_sub(1);
    for (i, (field, value)) in header.key.iter().zip(values).enumerate() {
        if i == last && mode == PrefixMatch::Open {
            encode_sortable_open(field.value_type, value, &mut buf)?;
        } else {
            encode_sortable(field.value_type, value, &mut buf)?;
        }
    }
    Ok(buf)
}

/// Decode a full key, requiring every byte to be consumed.
pub fn decode_key(header: &Header, data: &[u8]) -> CodecResult<Key> {
    let (key, consumed) = decode_key_at(header, data, 0)?;
    if consumed != data.len() {
        return Err(CodecError::TrailingBytes {
            offset: consumed,
            remaining: data.len() - consumed,
        });
    }
    Ok(key)
}

/// Decode a full key starting at `offset`.
///
/// Returns the key and the offset just past its last field.
pub fn decode_key_at(header: &Header, data: &[u8], offset: usize) -> CodecResult<(Key, usize)> {
    let mut key = Vec::with_capacity(header.key.len());
    let mut pos = offset;
    for field in &header.key {
        let (value, consumed) = decode_sortable(field.value_type, data, pos)?;
        key.push(value);
        pos += consumed;
    }
    Ok((key, pos))
}

// =============================================================================
// Ranges
// =============================================================================

/// Half-open byte range `[start, end)`. A missing `end` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound.
    pub start: Vec<u8>,
    /// Exclusive upper bound, `None` for no upper bound.
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    /// Range of every byte string that begins with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let mut end = prefix.clone();
        let end = strinc(&mut end).then_some(end);
        Self { start: prefix, end }
    }

    /// Whether `key` lies inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().map_or(true, |end| key < end)
    }
}

/// Turn `data` into the smallest byte string greater than every string that
/// has `data` as a prefix.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented. Returns false if `data` was empty or all `0xFF`: no such
/// string exists and the range has no upper bound.
pub fn strinc(data: &mut Vec<u8>) -> bool {
    while let Some(&last) = data.last() {
        if last < 0xFF {
            let len = data.len();
            data[len - 1] = last + 1;
            return true;
        }
        data.pop();
    }
    false
}
