//! Row payload encoding.
//!
//! A payload is the opaque encoding of each data field, concatenated in
//! header order. Order does not matter here, only exact round-trip.

use super::CodecError;
use super::CodecResult;
use super::scalar::decode_opaque;
use super::scalar::encode_opaque;
use crate::types::Data;
use crate::types::Header;
use crate::types::Value;

/// Encode the data fields of a tuple.
pub fn encode_payload(header: &Header, data: &[Value]) -> CodecResult<Vec<u8>> {
    if data.len() != header.data.len() {
        return Err(CodecError::FieldCount {
            expected: header.data.len(),
            found: data.len(),
        });
    }
    let mut buf = Vec::new();
    for (field, value) in header.data.iter().zip(data) {
        encode_opaque(field.value_type, value, &mut buf)?;
    }
    Ok(buf)
}

/// Decode a payload written by [`encode_payload`] under the same header.
pub fn decode_payload(header: &Header, bytes: &[u8]) -> CodecResult<Data> {
    let mut data = Vec::with_capacity(header.data.len());
    let mut pos = 0;
    for field in &header.data {
        let (value, consumed) = decode_opaque(field.value_type, bytes, pos)?;
        data.push(value);
        pos += consumed;
    }
    if pos != bytes.len() {
        return Err(CodecError::TrailingBytes {
            offset: pos,
            remaining: bytes.len() - pos,
        });
    }
    Ok(data)
}
