//! Table catalog: table names to stable identifiers and headers.
//!
//! # Persisted Layout
//!
//! ```text
//! FE 01 <sortable name>   -> catalog record
//! FE 02                   -> last assigned table id (u64 big-endian)
//! <id u64 big-endian> ... -> rows of table `id`
//! ```
//!
//! Table ids start at 1, only move forward and are never reused, even after
//! a drop. They stay below 2^56, so a row key always starts with `0x00` and
//! never collides with the `0xFE` metadata namespace.
//!
//! The id counter is read and written through the caller's transaction like
//! any other key, so concurrent table creation is serialized by the
//! backend's own conflict detection.
//!
//! A catalog record is a version byte followed by opaque values:
//! `UInt(id) String(name) UInt(n_key) (String UInt)* UInt(n_data) (String UInt)*`,
//! where each pair is a field name and its type tag.

use tracing::debug;
use tracing::instrument;

use crate::backend::KvTransaction;
use crate::backend::delete_range;
use crate::codec::CodecError;
use crate::codec::CodecResult;
use crate::codec::KeyRange;
use crate::codec::PrefixMatch;
use crate::codec::decode_key;
use crate::codec::decode_opaque;
use crate::codec::encode_key_into;
use crate::codec::encode_opaque;
use crate::codec::encode_prefix;
use crate::codec::encode_sortable;
use crate::constants::CATALOG_FORMAT_VERSION;
use crate::constants::MAX_DATA_FIELDS;
use crate::constants::MAX_KEY_FIELDS;
use crate::constants::MAX_TABLE_ID;
use crate::constants::META_COUNTER_TAG;
use crate::constants::META_PREFIX;
use crate::constants::META_TABLE_TAG;
use crate::constants::TABLE_ID_WIDTH;
use crate::context::OpContext;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::types::Field;
use crate::types::Header;
use crate::types::Key;
use crate::types::KeyField;
use crate::types::Value;
use crate::types::ValueType;

// =============================================================================
// Table
// =============================================================================

/// A table: its immutable identifier and header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    id: u64,
    header: Header,
}

impl Table {
    /// Identifier assigned at creation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Table schema.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Byte prefix shared by every row of this table.
    pub fn prefix(&self) -> [u8; TABLE_ID_WIDTH] {
        self.id.to_be_bytes()
    }

    /// Backend key of the row with `key`.
    pub(crate) fn row_key(&self, key: &[Value]) -> CodecResult<Vec<u8>> {
        let mut buf = self.prefix().to_vec();
        encode_key_into(&self.header, key, &mut buf)?;
        Ok(buf)
    }

    /// Decode a backend row key back into key values.
    pub(crate) fn decode_row_key(&self, bytes: &[u8]) -> CodecResult<Key> {
        let prefix = self.prefix();
        let rest = bytes.strip_prefix(prefix.as_slice()).ok_or_else(|| CodecError::PrefixMismatch {
            expected: prefix.to_vec(),
        })?;
        decode_key(&self.header, rest)
    }

    /// Backend range of every row whose key starts with `explicit`.
    pub(crate) fn row_range(&self, explicit: &[&Value], mode: PrefixMatch) -> CodecResult<KeyRange> {
        let mut start = self.prefix().to_vec();
        start.extend(encode_prefix(&self.header, explicit, mode)?);
        Ok(KeyRange::prefix(start))
    }
}

// =============================================================================
// Catalog Operations
// =============================================================================

fn record_key(name: &str) -> StoreResult<Vec<u8>> {
    let mut key = vec![META_PREFIX, META_TABLE_TAG];
    encode_sortable(ValueType::String, &Value::from(name), &mut key)?;
    Ok(key)
}

fn counter_key() -> [u8; 2] {
    [META_PREFIX, META_COUNTER_TAG]
}

/// Create a table, assigning it the next identifier.
///
/// # Errors
///
/// `SchemaMismatch` if the header is invalid, `AlreadyExists` if the name is
/// taken.
#[instrument(skip(tx, ctx, header), fields(table = %header.name))]
pub(crate) fn create_table(tx: &mut dyn KvTransaction, ctx: &OpContext, header: Header) -> StoreResult<Table> {
    ctx.check()?;
    header.validate()?;

    let key = record_key(&header.name)?;
    if tx.get(ctx, &key)?.is_some() {
        return Err(StoreError::AlreadyExists {
            what: format!("table '{}'", header.name),
        });
    }

    let last = match tx.get(ctx, &counter_key())? {
        Some(bytes) => {
            let bytes: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CodecError::UnexpectedEnd { offset: bytes.len() })?;
            u64::from_be_bytes(bytes)
        }
        None => 0,
    };
    let Some(id) = last.checked_add(1).filter(|&id| id <= MAX_TABLE_ID) else {
        return Err(StoreError::schema(format!("table id limit {MAX_TABLE_ID} reached")));
    };

    let table = Table { id, header };
    tx.set(ctx, &counter_key(), &id.to_be_bytes())?;
    tx.set(ctx, &key, &encode_record(&table)?)?;
    debug!(id, "created table");
    Ok(table)
}

/// Look up a table by name.
pub(crate) fn get_table(tx: &dyn KvTransaction, ctx: &OpContext, name: &str) -> StoreResult<Table> {
    ctx.check()?;
    let bytes = tx.get(ctx, &record_key(name)?)?.ok_or_else(|| StoreError::NotFound {
        what: format!("table '{name}'"),
    })?;
    Ok(decode_record(&bytes)?)
}

/// Every table, in name order.
pub(crate) fn list_tables(tx: &dyn KvTransaction, ctx: &OpContext) -> StoreResult<Vec<Table>> {
    ctx.check()?;
    let low = [META_PREFIX, META_TABLE_TAG];
    let high = [META_PREFIX, META_TABLE_TAG + 1];
    let mut cursor = tx.range(ctx, &low, Some(high.as_slice()))?;
    let mut tables = Vec::new();
    while let Some((_, value)) = cursor.next(ctx)? {
        tables.push(decode_record(&value)?);
    }
    Ok(tables)
}

/// Delete a table and all of its rows. Returns the number of rows removed.
#[instrument(skip(tx, ctx))]
pub(crate) fn drop_table(tx: &mut dyn KvTransaction, ctx: &OpContext, name: &str) -> StoreResult<u64> {
    let table = get_table(tx, ctx, name)?;
    let range = table.row_range(&[], PrefixMatch::Exact)?;
    let rows = delete_range(tx, ctx, &range.start, range.end.as_deref())?;
    tx.delete(ctx, &record_key(name)?)?;
    debug!(id = table.id, rows, "dropped table");
    Ok(rows)
}

// =============================================================================
// Record Encoding
// =============================================================================

fn encode_record(table: &Table) -> CodecResult<Vec<u8>> {
    let header = &table.header;
    let mut buf = vec![CATALOG_FORMAT_VERSION];
    encode_opaque(ValueType::UInt, &Value::UInt(table.id), &mut buf)?;
    encode_opaque(ValueType::String, &Value::from(header.name.as_str()), &mut buf)?;

    let key_fields = header.key.iter().map(|f| (f.name.as_str(), f.value_type));
    encode_fields(key_fields, header.key.len(), &mut buf)?;
    let data_fields = header.data.iter().map(|f| (f.name.as_str(), f.value_type));
    encode_fields(data_fields, header.data.len(), &mut buf)?;
    Ok(buf)
}

fn encode_fields<'a>(
    fields: impl Iterator<Item = (&'a str, ValueType)>,
    count: usize,
    buf: &mut Vec<u8>,
) -> CodecResult<()> {
    encode_opaque(ValueType::UInt, &Value::UInt(count as u64), buf)?;
    for (name, value_type) in fields {
        encode_opaque(ValueType::String, &Value::from(name), buf)?;
        encode_opaque(ValueType::UInt, &Value::UInt(u64::from(value_type.tag())), buf)?;
    }
    Ok(())
}

fn decode_record(bytes: &[u8]) -> CodecResult<Table> {
    let mut reader = RecordReader { bytes, pos: 0 };
    let version = reader.version()?;
    if version != CATALOG_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }

    let id = reader.uint()?;
    let name = reader.string()?;

    let n_key = reader.count(MAX_KEY_FIELDS)?;
    let mut key = Vec::with_capacity(n_key);
    for _ in 0..n_key {
        let (name, value_type) = reader.field()?;
        key.push(KeyField::new(name, value_type));
    }

    let n_data = reader.count(MAX_DATA_FIELDS)?;
    let mut data = Vec::with_capacity(n_data);
    for _ in 0..n_data {
        let (name, value_type) = reader.field()?;
        data.push(Field::new(name, value_type));
    }

    reader.finish()?;
    Ok(Table {
        id,
        header: Header::new(name, key, data),
    })
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl RecordReader<'_> {
    fn version(&mut self) -> CodecResult<u8> {
        let &version = self.bytes.first().ok_or(CodecError::UnexpectedEnd { offset: 0 })?;
        self.pos = 1;
        Ok(version)
    }

    fn value(&mut self, ty: ValueType) -> CodecResult<Value> {
        let (value, consumed) = decode_opaque(ty, self.bytes, self.pos)?;
        self.pos += consumed;
        Ok(value)
    }

    fn uint(&mut self) -> CodecResult<u64> {
        match self.value(ValueType::UInt)? {
            Value::UInt(n) => Ok(n),
            other => Err(CodecError::TypeMismatch {
                expected: ValueType::UInt,
                found: other.value_type(),
                offset: self.pos,
            }),
        }
    }

    fn string(&mut self) -> CodecResult<String> {
        match self.value(ValueType::String)? {
            Value::String(s) => Ok(s),
            other => Err(CodecError::TypeMismatch {
                expected: ValueType::String,
                found: other.value_type(),
                offset: self.pos,
            }),
        }
    }

    /// Field count, bounded so a corrupt record cannot force a huge allocation.
    fn count(&mut self, max: u32) -> CodecResult<usize> {
        let offset = self.pos;
        let n = self.uint()?;
        if n > u64::from(max) {
            return Err(CodecError::LengthOverflow { len: n, offset });
        }
        Ok(n as usize)
    }

    fn field(&mut self) -> CodecResult<(String, ValueType)> {
        let name = self.string()?;
        let offset = self.pos;
        let tag = self.uint()?;
        let value_type = u8::try_from(tag)
            .ok()
            .and_then(ValueType::from_tag)
            .ok_or(CodecError::UnknownTypeTag { tag: tag as u8, offset })?;
        Ok((name, value_type))
    }

    fn finish(&self) -> CodecResult<()> {
        if self.pos != self.bytes.len() {
            return Err(CodecError::TrailingBytes {
                offset: self.pos,
                remaining: self.bytes.len() - self.pos,
            });
        }
        Ok(())
    }
}
