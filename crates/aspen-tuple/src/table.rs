//! Tuple operations on one table within one transaction.

use tracing::instrument;
use tracing::trace;

use crate::backend::KvTransaction;
use crate::backend::delete_range;
use crate::catalog::Table;
use crate::codec::PrefixMatch;
use crate::codec::decode_payload;
use crate::codec::encode_payload;
use crate::constants::MAX_KEY_SIZE;
use crate::constants::MAX_VALUE_SIZE;
use crate::context::OpContext;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::iter::RangeIter;
use crate::types::Header;
use crate::types::KeyPrefix;
use crate::types::Tuple;
use crate::types::Value;

/// Options for [`TupleTable::scan_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOptions {
    /// Leading key values to match; `None` entries are trailing wildcards.
    pub prefix: KeyPrefix,
    /// Stop after this many rows.
    pub limit: Option<u64>,
    /// Skip payload decoding; [`RangeIter::data`] yields an empty slice.
    pub keys_only: bool,
}

impl ScanOptions {
    /// Scan rows whose key starts with `prefix`.
    pub fn with_prefix(prefix: KeyPrefix) -> Self {
        Self {
            prefix,
            ..Self::default()
        }
    }

    /// Stop after `limit` rows.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Decode keys only.
    pub fn with_keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }
}

/// Options for [`TupleTable::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert the row if it does not exist instead of failing `NotFound`.
    pub upsert: bool,
}

/// A table opened inside a transaction.
///
/// Borrows the transaction mutably, so the transaction cannot be committed
/// or rolled back while the table is in use. Scans borrow the table, so
/// rows cannot be written while an iterator is open.
pub struct TupleTable<'t> {
    kv: &'t mut (dyn KvTransaction + 't),
    table: Table,
}

impl std::fmt::Debug for TupleTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TupleTable").field("table", &self.table).finish()
    }
}

impl<'t> TupleTable<'t> {
    pub(crate) fn new(kv: &'t mut (dyn KvTransaction + 't), table: Table) -> Self {
        Self { kv, table }
    }

    /// The table's catalog entry.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The table's header.
    pub fn header(&self) -> &Header {
        self.table.header()
    }

    /// Insert a new row.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if the tuple does not fit the header or is too large,
    /// `AlreadyExists` if a row with the same key exists. Nothing is written
    /// on error.
    #[instrument(skip_all, fields(table = %self.table.name()))]
    pub fn insert(&mut self, ctx: &OpContext, tuple: &Tuple) -> StoreResult<()> {
        ctx.check()?;
        let (key, value) = self.encode_row(tuple)?;
        if self.kv.get(ctx, &key)?.is_some() {
            return Err(StoreError::AlreadyExists {
                what: self.describe_row(&tuple.key),
            });
        }
        self.kv.set(ctx, &key, &value)?;
        trace!(key_len = key.len(), value_len = value.len(), "inserted row");
        Ok(())
    }

    /// Fetch the row with `key`.
    #[instrument(skip_all, fields(table = %self.table.name()))]
    pub fn get(&self, ctx: &OpContext, key: &[Value]) -> StoreResult<Tuple> {
        ctx.check()?;
        let row_key = self.encode_key(key)?;
        let value = self.kv.get(ctx, &row_key)?.ok_or_else(|| StoreError::NotFound {
            what: self.describe_row(key),
        })?;
        let data = decode_payload(self.table.header(), &value)?;
        Ok(Tuple::new(key.to_vec(), data))
    }

    /// Iterate over rows whose key starts with `prefix`, in key order.
    ///
    /// An empty prefix scans the whole table.
    pub fn scan(&self, ctx: &OpContext, prefix: &[Option<Value>]) -> StoreResult<RangeIter<'_>> {
        self.scan_inner(ctx, prefix, None, false)
    }

    /// [`TupleTable::scan`] with a row limit and optional payload skipping.
    pub fn scan_with(&self, ctx: &OpContext, options: &ScanOptions) -> StoreResult<RangeIter<'_>> {
        self.scan_inner(ctx, &options.prefix, options.limit, options.keys_only)
    }

    fn scan_inner(
        &self,
        ctx: &OpContext,
        prefix: &[Option<Value>],
        limit: Option<u64>,
        keys_only: bool,
    ) -> StoreResult<RangeIter<'_>> {
        ctx.check()?;
        let explicit = self.table.header().check_prefix(prefix)?;
        let range = self.table.row_range(&explicit, PrefixMatch::of(prefix))?;
        trace!(table = %self.table.name(), explicit = explicit.len(), "scan");
        let cursor = self.kv.range(ctx, &range.start, range.end.as_deref())?;
        Ok(RangeIter::new(cursor, &self.table, ctx.clone(), limit, keys_only))
    }

    /// Overwrite the payload of an existing row.
    ///
    /// With `upsert`, a missing row is inserted instead of failing.
    #[instrument(skip_all, fields(table = %self.table.name(), upsert = options.upsert))]
    pub fn update(&mut self, ctx: &OpContext, tuple: &Tuple, options: UpdateOptions) -> StoreResult<()> {
        ctx.check()?;
        let (key, value) = self.encode_row(tuple)?;
        if !options.upsert && self.kv.get(ctx, &key)?.is_none() {
            return Err(StoreError::NotFound {
                what: self.describe_row(&tuple.key),
            });
        }
        self.kv.set(ctx, &key, &value)?;
        trace!(key_len = key.len(), value_len = value.len(), "updated row");
        Ok(())
    }

    /// Delete the row with `key`.
    #[instrument(skip_all, fields(table = %self.table.name()))]
    pub fn delete(&mut self, ctx: &OpContext, key: &[Value]) -> StoreResult<()> {
        ctx.check()?;
        let row_key = self.encode_key(key)?;
        if self.kv.get(ctx, &row_key)?.is_none() {
            return Err(StoreError::NotFound {
                what: self.describe_row(key),
            });
        }
        self.kv.delete(ctx, &row_key)?;
        trace!("deleted row");
        Ok(())
    }

    /// Delete every row whose key starts with `prefix`. Returns the count.
    #[instrument(skip_all, fields(table = %self.table.name()))]
    pub fn delete_prefix(&mut self, ctx: &OpContext, prefix: &[Option<Value>]) -> StoreResult<u64> {
        ctx.check()?;
        let explicit = self.table.header().check_prefix(prefix)?;
        let range = self.table.row_range(&explicit, PrefixMatch::of(prefix))?;
        let deleted = delete_range(&mut *self.kv, ctx, &range.start, range.end.as_deref())?;
        trace!(deleted, "deleted rows by prefix");
        Ok(deleted)
    }

    /// Delete every row of the table. Returns the count.
    pub fn clear(&mut self, ctx: &OpContext) -> StoreResult<u64> {
        self.delete_prefix(ctx, &[])
    }

    fn encode_key(&self, key: &[Value]) -> StoreResult<Vec<u8>> {
        self.table.header().check_key(key)?;
        let row_key = self.table.row_key(key)?;
        if row_key.len() > MAX_KEY_SIZE as usize {
            return Err(StoreError::schema(format!(
                "encoded key is {} bytes, max is {MAX_KEY_SIZE}",
                row_key.len()
            )));
        }
        Ok(row_key)
    }

    fn encode_row(&self, tuple: &Tuple) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        let key = self.encode_key(&tuple.key)?;
        self.table.header().check_data(&tuple.data)?;
        let value = encode_payload(self.table.header(), &tuple.data)?;
        if value.len() > MAX_VALUE_SIZE as usize {
            return Err(StoreError::schema(format!(
                "encoded payload is {} bytes, max is {MAX_VALUE_SIZE}",
                value.len()
            )));
        }
        Ok((key, value))
    }

    fn describe_row(&self, key: &[Value]) -> String {
        let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
        format!("row ({}) in table '{}'", parts.join(", "), self.table.name())
    }
}
