use snafu::ResultExt;

use super::CodecError;
use super::CodecResult;
use super::InvalidUtf8Snafu;
use super::NULL_BYTE;
use super::NULL_ESCAPE;
use super::SIGN_BIT;
use super::read_array;
use crate::constants::MAX_VALUE_SIZE;
use crate::types::Timestamp;
use crate::types::Value;
use crate::types::ValueType;

// =============================================================================
// Sortable Encoding
// =============================================================================

/// Append the order-preserving encoding of `value` to `buf`.
///
/// # Errors
///
/// `NotSortable` for opaque types, `TypeMismatch` if `value` is not of type `ty`.
pub fn encode_sortable(ty: ValueType, value: &Value, buf: &mut Vec<u8>) -> CodecResult<()> {
    if !ty.is_sortable() {
        return Err(CodecError::NotSortable { value_type: ty });
    }
    check_value_type(ty, value)?;

    match value {
        Value::String(s) => encode_escaped(s.as_bytes(), buf),
        Value::Bytes(b) => encode_escaped(b, buf),
        Value::Int(n) => encode_biased(*n, buf),
        Value::UInt(n) => buf.extend_from_slice(&n.to_be_bytes()),
        Value::Bool(b) => buf.push(u8::from(*b)),
        Value::Time(t) => encode_biased(t.as_nanos(), buf),
        Value::Float(_) => return Err(CodecError::NotSortable { value_type: ty }),
    }
    Ok(())
}

/// Append the sortable encoding of `value` with the terminator left off.
///
/// The result is a byte prefix of the sortable encoding of every string or
/// byte string whose content starts with `value`'s content. Fixed-width
/// types have no terminator and encode exactly as [`encode_sortable`] does.
pub fn encode_sortable_open(ty: ValueType, value: &Value, buf: &mut Vec<u8>) -> CodecResult<()> {
    match value {
        Value::String(s) if ty == ValueType::String => escape_content(s.as_bytes(), buf),
        Value::Bytes(b) if ty == ValueType::Bytes => escape_content(b, buf),
        _ => return encode_sortable(ty, value, buf),
    }
    Ok(())
}

/// Decode one sortable value of type `ty` starting at `offset`.
///
/// Returns the value and the number of bytes consumed. No external length is
/// needed: fixed-width types know their size and strings end at their
/// terminator.
pub fn decode_sortable(ty: ValueType, data: &[u8], offset: usize) -> CodecResult<(Value, usize)> {
    match ty {
        ValueType::String => {
            let (bytes, consumed) = decode_escaped(data, offset)?;
            let s = String::from_utf8(bytes).context(InvalidUtf8Snafu { offset })?;
            Ok((Value::String(s), consumed))
        }
        ValueType::Bytes => {
            let (bytes, consumed) = decode_escaped(data, offset)?;
            Ok((Value::Bytes(bytes), consumed))
        }
        ValueType::Int => Ok((Value::Int(decode_biased(data, offset)?), 8)),
        ValueType::UInt => Ok((Value::UInt(u64::from_be_bytes(read_array(data, offset)?)), 8)),
        ValueType::Bool => Ok((Value::Bool(decode_bool(data, offset)?), 1)),
        ValueType::Time => Ok((Value::Time(Timestamp::from_nanos(decode_biased(data, offset)?)), 8)),
        ValueType::Float => Err(CodecError::NotSortable { value_type: ty }),
    }
}

/// Escape embedded nulls and append the two-byte terminator.
fn encode_escaped(content: &[u8], buf: &mut Vec<u8>) {
    escape_content(content, buf);
    buf.push(NULL_BYTE);
    buf.push(NULL_BYTE);
}

fn escape_content(content: &[u8], buf: &mut Vec<u8>) {
    buf.reserve(content.len() + 2);
    let mut rest = content;
    while let Some(pos) = rest.iter().position(|&b| b == NULL_BYTE) {
        buf.extend_from_slice(&rest[..=pos]);
        buf.push(NULL_ESCAPE);
        rest = &rest[pos + 1..];
    }
    buf.extend_from_slice(rest);
}

/// Decode escaped content starting at `start`.
///
/// Returns the content and the bytes consumed, terminator included.
fn decode_escaped(data: &[u8], start: usize) -> CodecResult<(Vec<u8>, usize)> {
    let mut content = Vec::new();
    let mut i = start;

    while i < data.len() {
        let Some(pos) = data[i..].iter().position(|&b| b == NULL_BYTE) else {
            break;
        };
        content.extend_from_slice(&data[i..i + pos]);
        i += pos;

        match data.get(i + 1) {
            Some(&NULL_ESCAPE) => {
                content.push(NULL_BYTE);
                i += 2;
            }
            Some(&NULL_BYTE) => return Ok((content, i + 2 - start)),
            Some(&byte) => return Err(CodecError::InvalidEscape { byte, offset: i + 1 }),
            None => break,
        }
    }

    Err(CodecError::MissingTerminator { offset: start })
}

fn encode_biased(n: i64, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&((n as u64) ^ SIGN_BIT).to_be_bytes());
}

fn decode_biased(data: &[u8], offset: usize) -> CodecResult<i64> {
    let raw = u64::from_be_bytes(read_array(data, offset)?);
    Ok((raw ^ SIGN_BIT) as i64)
}

fn decode_bool(data: &[u8], offset: usize) -> CodecResult<bool> {
    match data.get(offset) {
        Some(&0x00) => Ok(false),
        Some(&0x01) => Ok(true),
        Some(&byte) => Err(CodecError::InvalidBool { byte, offset }),
        None => Err(CodecError::UnexpectedEnd { offset }),
    }
}

// =============================================================================
// Opaque Encoding
// =============================================================================

/// Append the tag-length-value encoding of `value` to `buf`.
///
/// Layout: type tag, then either the fixed-width big-endian value or a
/// 4-byte big-endian length followed by the raw content.
pub fn encode_opaque(ty: ValueType, value: &Value, buf: &mut Vec<u8>) -> CodecResult<()> {
    check_value_type(ty, value)?;

    buf.push(ty.tag());
    match value {
        Value::String(s) => encode_length_prefixed(s.as_bytes(), buf)?,
        Value::Bytes(b) => encode_length_prefixed(b, buf)?,
        Value::Int(n) => buf.extend_from_slice(&n.to_be_bytes()),
        Value::UInt(n) => buf.extend_from_slice(&n.to_be_bytes()),
        Value::Bool(b) => buf.push(u8::from(*b)),
        Value::Time(t) => buf.extend_from_slice(&t.as_nanos().to_be_bytes()),
        Value::Float(x) => buf.extend_from_slice(&x.to_bits().to_be_bytes()),
    }
    Ok(())
}

/// Decode one opaque value of type `ty` starting at `offset`.
///
/// The leading tag must match `ty`; returns the value and bytes consumed.
pub fn decode_opaque(ty: ValueType, data: &[u8], offset: usize) -> CodecResult<(Value, usize)> {
    let &tag = data.get(offset).ok_or(CodecError::UnexpectedEnd { offset })?;
    let found = ValueType::from_tag(tag).ok_or(CodecError::UnknownTypeTag { tag, offset })?;
    if found != ty {
        return Err(CodecError::TypeMismatch {
            expected: ty,
            found,
            offset,
        });
    }

    let body = offset + 1;
    let (value, width) = match ty {
        ValueType::String => {
            let (bytes, width) = decode_length_prefixed(data, body)?;
            let s = String::from_utf8(bytes.to_vec()).context(InvalidUtf8Snafu { offset: body })?;
            (Value::String(s), width)
        }
        ValueType::Bytes => {
            let (bytes, width) = decode_length_prefixed(data, body)?;
            (Value::Bytes(bytes.to_vec()), width)
        }
        ValueType::Int => (Value::Int(i64::from_be_bytes(read_array(data, body)?)), 8),
        ValueType::UInt => (Value::UInt(u64::from_be_bytes(read_array(data, body)?)), 8),
        ValueType::Bool => (Value::Bool(decode_bool(data, body)?), 1),
        ValueType::Time => (Value::Time(Timestamp::from_nanos(i64::from_be_bytes(read_array(data, body)?))), 8),
        ValueType::Float => (Value::Float(f64::from_bits(u64::from_be_bytes(read_array(data, body)?))), 8),
    };
    Ok((value, 1 + width))
}

fn encode_length_prefixed(content: &[u8], buf: &mut Vec<u8>) -> CodecResult<()> {
    let len = u32::try_from(content.len())
        .ok()
        .filter(|&len| len <= MAX_VALUE_SIZE)
        .ok_or(CodecError::LengthOverflow {
            len: content.len() as u64,
            offset: buf.len(),
        })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(content);
    Ok(())
}

fn decode_length_prefixed(data: &[u8], offset: usize) -> CodecResult<(&[u8], usize)> {
    let len = u32::from_be_bytes(read_array(data, offset)?);
    let start = offset + 4;
    let content = data
        .get(start..start.saturating_add(len as usize))
        .filter(|_| len <= MAX_VALUE_SIZE)
        .ok_or(CodecError::LengthOverflow {
            len: u64::from(len),
            offset,
        })?;
    Ok((content, 4 + content.len()))
}

fn check_value_type(ty: ValueType, value: &Value) -> CodecResult<()> {
    let found = value.value_type();
    if found != ty {
        return Err(CodecError::TypeMismatch {
            expected: ty,
            found,
            offset: 0,
        });
    }
    Ok(())
}
