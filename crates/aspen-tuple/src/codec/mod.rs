//! Byte codecs for keys and payloads.
//!
//! Three layers build on each other:
//!
//! - [`scalar`]: one value to bytes. The *sortable* form preserves order under
//!   byte-wise comparison; the *opaque* form only has to round-trip.
//! - [`key`]: concatenates sortable encodings into a composite key and turns a
//!   partial key into a contiguous byte range.
//! - [`payload`]: concatenates opaque encodings into a row payload.
//!
//! # Sortable Encodings
//!
//! | Type | Bytes |
//! |------|-------|
//! | uint | 8 bytes big-endian |
//! | int | 8 bytes big-endian, sign bit flipped |
//! | time | nanoseconds since epoch, encoded like int |
//! | bool | `0x00` false, `0x01` true |
//! | string, bytes | content with `0x00` escaped as `0x00 0xFF`, then `0x00 0x00` |
//!
//! The two-byte terminator is what keeps the key unambiguous without type
//! codes between fields: after a `0x00` the next byte is always `0xFF`
//! (escaped null) or `0x00` (end), whatever the following field starts with.
//! It also sorts below every continuation, so `"a"` sorts before `"a\0"` and
//! before `"aa"`.

mod key;
mod payload;
mod scalar;

#[cfg(test)]
mod tests;

pub use key::KeyRange;
pub use key::PrefixMatch;
pub use key::decode_key;
pub use key::decode_key_at;
pub use key::encode_key;
pub use key::encode_key_into;
pub use key::encode_prefix;
pub use key::strinc;
pub use payload::decode_payload;
pub use payload::encode_payload;
pub use scalar::decode_opaque;
pub use scalar::decode_sortable;
pub use scalar::encode_opaque;
pub use scalar::encode_sortable;
pub use scalar::encode_sortable_open;
use snafu::Snafu;

use crate::types::ValueType;

/// Escape byte following an embedded `0x00` in string and byte content.
const NULL_ESCAPE: u8 = 0xFF;

/// Byte that starts both escape sequences and the terminator.
const NULL_BYTE: u8 = 0x00;

/// Flips the sign bit so negative integers sort below non-negative ones.
const SIGN_BIT: u64 = 1 << 63;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while encoding or decoding values.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    /// Unexpected end of input while decoding.
    #[snafu(display("unexpected end of input at offset {offset}"))]
    UnexpectedEnd {
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// String or byte content never reached its terminator.
    #[snafu(display("missing terminator for field starting at offset {offset}"))]
    MissingTerminator {
        /// Offset where the field started.
        offset: usize,
    },

    /// A `0x00` was followed by something other than `0x00` or `0xFF`.
    #[snafu(display("invalid escape byte 0x{byte:02X} at offset {offset}"))]
    InvalidEscape {
        /// The offending byte.
        byte: u8,
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// String content is not valid UTF-8.
    #[snafu(display("invalid UTF-8 at offset {offset}: {source}"))]
    InvalidUtf8 {
        /// Offset where the field started.
        offset: usize,
        /// The underlying UTF-8 error.
        source: std::string::FromUtf8Error,
    },

    /// Boolean byte other than `0x00` or `0x01`.
    #[snafu(display("invalid boolean byte 0x{byte:02X} at offset {offset}"))]
    InvalidBool {
        /// The offending byte.
        byte: u8,
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// Payload type tag is not a known type.
    #[snafu(display("unknown type tag 0x{tag:02X} at offset {offset}"))]
    UnknownTypeTag {
        /// The unknown tag.
        tag: u8,
        /// Byte offset where the error occurred.
        offset: usize,
    },

    /// A value's type does not match the declared type.
    #[snafu(display("type mismatch at offset {offset}: expected {expected}, found {found}"))]
    TypeMismatch {
        /// Declared type.
        expected: ValueType,
        /// Actual type.
        found: ValueType,
        /// Byte offset of the value (0 when encoding).
        offset: usize,
    },

    /// An opaque type was used where a sortable one is required.
    #[snafu(display("type {value_type} has no sortable encoding"))]
    NotSortable {
        /// The opaque type.
        value_type: ValueType,
    },

    /// Number of values does not match the number of fields.
    #[snafu(display("expected {expected} values, found {found}"))]
    FieldCount {
        /// Declared field count.
        expected: usize,
        /// Actual value count.
        found: usize,
    },

    /// Input continues after the last declared field.
    #[snafu(display("{remaining} trailing bytes at offset {offset}"))]
    TrailingBytes {
        /// Offset of the first unconsumed byte.
        offset: usize,
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// Length prefix is larger than the remaining input or the value limit.
    #[snafu(display("length {len} at offset {offset} exceeds available input"))]
    LengthOverflow {
        /// The declared length.
        len: u64,
        /// Byte offset of the length prefix.
        offset: usize,
    },

    /// Backend key does not carry the expected table prefix.
    #[snafu(display("key does not start with table prefix {expected:02X?}"))]
    PrefixMismatch {
        /// The expected prefix bytes.
        expected: Vec<u8>,
    },

    /// Catalog record has an unsupported format version.
    #[snafu(display("unsupported catalog format version {version}"))]
    UnsupportedVersion {
        /// The version byte read.
        version: u8,
    },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Read `N` bytes at `offset`, failing with `UnexpectedEnd` if short.
fn read_array<const N: usize>(data: &[u8], offset: usize) -> CodecResult<[u8; N]> {
    data.get(offset..offset.saturating_add(N))
        .and_then(|s| <[u8; N]>::try_from(s).ok())
        .ok_or(CodecError::UnexpectedEnd { offset })
}
