//! Fixed limits and persisted-layout marker bytes.
//!
//! Tiger Style: every limit is a compile-time constant with an explicit bound.
//! The marker bytes are part of the on-disk format and must never change.

// ============================================================================
// Persisted Layout
// ============================================================================

/// First byte of every catalog key.
///
/// Row keys start with the big-endian table id whose top byte is always 0x00
/// (see [`MAX_TABLE_ID`]), so metadata and row data never share a prefix.
pub const META_PREFIX: u8 = 0xFE;

/// Second byte of catalog records: `META_PREFIX ++ META_TABLE_TAG ++ name`.
pub const META_TABLE_TAG: u8 = 0x01;

/// Second byte of the table id counter key.
pub const META_COUNTER_TAG: u8 = 0x02;

/// Width of the table id prefix in bytes.
pub const TABLE_ID_WIDTH: usize = 8;

/// Largest assignable table id (top byte must stay 0x00).
pub const MAX_TABLE_ID: u64 = (1 << 56) - 1;

/// Version byte leading every serialized catalog record.
pub const CATALOG_FORMAT_VERSION: u8 = 1;

// ============================================================================
// Schema Limits
// ============================================================================

/// Maximum number of key fields in a header.
pub const MAX_KEY_FIELDS: u32 = 32;

/// Maximum number of data fields in a header.
pub const MAX_DATA_FIELDS: u32 = 256;

/// Maximum length of a table or field name in bytes.
pub const MAX_NAME_LENGTH_BYTES: u32 = 255;

// ============================================================================
// Row Size Limits
// ============================================================================

/// Maximum size of an encoded backend key (table prefix included), 4 KB.
///
/// Tiger Style: oversized keys are rejected before they reach the backend.
pub const MAX_KEY_SIZE: u32 = 4 * 1024;

/// Maximum size of an encoded payload, 4 MB.
pub const MAX_VALUE_SIZE: u32 = 4 * 1024 * 1024;

// ============================================================================
// Scan Limits
// ============================================================================

/// Default number of rows a paged cursor fetches per backend round trip.
pub const DEFAULT_SCAN_BATCH_SIZE: u32 = 256;

/// Upper bound for the configurable scan batch size.
pub const MAX_SCAN_BATCH_SIZE: u32 = 10_000;

// ============================================================================
// Compile-Time Assertions
// ============================================================================

const _: () = assert!(MAX_TABLE_ID.to_be_bytes()[0] == 0x00);
const _: () = assert!(META_PREFIX != 0x00);
const _: () = assert!(META_TABLE_TAG < META_COUNTER_TAG);
const _: () = assert!(DEFAULT_SCAN_BATCH_SIZE > 0);
const _: () = assert!(DEFAULT_SCAN_BATCH_SIZE <= MAX_SCAN_BATCH_SIZE);
const _: () = assert!(MAX_KEY_SIZE as usize > TABLE_ID_WIDTH);
