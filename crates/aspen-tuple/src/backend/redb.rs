//! Embedded backend on a single redb table.
//!
//! redb serializes write transactions, so read-write transactions never
//! conflict; a second `begin` in read-write mode waits for the first to
//! finish. Read-only transactions see the snapshot current at `begin`.
//!
//! Cursors page through the table `scan_batch_size` rows at a time and
//! re-open the table for every page, so no redb borrow is held between
//! calls and a cursor can be abandoned at any point.

use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

use redb::Database;
use redb::ReadTransaction;
use redb::ReadableTable;
use redb::TableDefinition;
use redb::WriteTransaction;
use redb::backends::InMemoryBackend;
use snafu::ResultExt;
use snafu::Snafu;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::BackendError;
use super::BackendResult;
use super::KvBackend;
use super::KvCursor;
use super::KvTransaction;
use super::TxMode;
use super::ensure_live;
use super::is_empty_range;
use crate::constants::MAX_SCAN_BATCH_SIZE;
use crate::context::OpContext;

/// Every tuple store key lives in this one table.
const ROWS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tuple_rows");

/// Errors from redb operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RedbError {
    /// Failed to open or create the database file.
    #[snafu(display("failed to open redb database at {}: {source}", path.display()))]
    OpenDatabase {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying database error.
        #[snafu(source(from(redb::DatabaseError, Box::new)))]
        source: Box<redb::DatabaseError>,
    },

    /// Failed to create an in-memory database.
    #[snafu(display("failed to create in-memory redb database: {source}"))]
    CreateInMemory {
        /// The underlying database error.
        #[snafu(source(from(redb::DatabaseError, Box::new)))]
        source: Box<redb::DatabaseError>,
    },

    /// Failed to begin a write transaction.
    #[snafu(display("failed to begin write transaction: {source}"))]
    BeginWrite {
        /// The underlying transaction error.
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
    },

    /// Failed to begin a read transaction.
    #[snafu(display("failed to begin read transaction: {source}"))]
    BeginRead {
        /// The underlying transaction error.
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
    },

    /// Failed to open the rows table.
    #[snafu(display("failed to open table: {source}"))]
    OpenTable {
        /// The underlying table error.
        #[snafu(source(from(redb::TableError, Box::new)))]
        source: Box<redb::TableError>,
    },

    /// Failed to commit a transaction.
    #[snafu(display("failed to commit transaction: {source}"))]
    Commit {
        /// The underlying commit error.
        #[snafu(source(from(redb::CommitError, Box::new)))]
        source: Box<redb::CommitError>,
    },

    /// Failed to read from the rows table.
    #[snafu(display("failed to read from table: {source}"))]
    Read {
        /// The underlying storage error.
        #[snafu(source(from(redb::StorageError, Box::new)))]
        source: Box<redb::StorageError>,
    },

    /// Failed to write to the rows table.
    #[snafu(display("failed to write to table: {source}"))]
    Write {
        /// The underlying storage error.
        #[snafu(source(from(redb::StorageError, Box::new)))]
        source: Box<redb::StorageError>,
    },
}

impl From<RedbError> for BackendError {
    fn from(err: RedbError) -> Self {
        BackendError::Storage { source: Box::new(err) }
    }
}

// =============================================================================
// Backend
// =============================================================================

/// redb-backed storage.
pub struct RedbBackend {
    db: Database,
    scan_batch_size: usize,
}

impl RedbBackend {
    /// Open the database file at `path`, creating it if missing.
    pub fn create(path: impl AsRef<Path>, scan_batch_size: u32) -> BackendResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path).context(OpenDatabaseSnafu { path })?;
        debug!(path = %path.display(), "opened redb tuple backend");
        Self::init(db, scan_batch_size)
    }

    /// Create a database that lives only in memory.
    pub fn in_memory(scan_batch_size: u32) -> BackendResult<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new()).context(CreateInMemorySnafu)?;
        Self::init(db, scan_batch_size)
    }

    fn init(db: Database, scan_batch_size: u32) -> BackendResult<Self> {
        let tx = db.begin_write().context(BeginWriteSnafu)?;
        tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?;
        tx.commit().context(CommitSnafu)?;
        Ok(Self {
            db,
            scan_batch_size: scan_batch_size.clamp(1, MAX_SCAN_BATCH_SIZE) as usize,
        })
    }
}

impl KvBackend for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn begin(&self, ctx: &OpContext, mode: TxMode) -> BackendResult<Box<dyn KvTransaction + '_>> {
        ensure_live(ctx)?;
        let inner = match mode {
            TxMode::ReadOnly => RedbTx::Read(self.db.begin_read().context(BeginReadSnafu)?),
            TxMode::ReadWrite => RedbTx::Write(self.db.begin_write().context(BeginWriteSnafu)?),
        };
        trace!(?mode, "redb transaction begin");
        Ok(Box::new(RedbTransaction {
            inner,
            mode,
            scan_batch_size: self.scan_batch_size,
        }))
    }
}

// =============================================================================
// Transaction
// =============================================================================

enum RedbTx {
    Read(ReadTransaction),
    Write(WriteTransaction),
    /// Left behind once `commit` has consumed the redb transaction.
    Finished,
}

struct RedbTransaction {
    inner: RedbTx,
    mode: TxMode,
    scan_batch_size: usize,
}

impl RedbTransaction {
    fn write_tx(&self) -> BackendResult<&WriteTransaction> {
        match &self.inner {
            RedbTx::Write(tx) => Ok(tx),
            RedbTx::Read(_) => Err(BackendError::ReadOnly),
            RedbTx::Finished => Err(BackendError::Finished),
        }
    }

    fn read_batch(&self, start: &[u8], end: Option<&[u8]>, limit: usize) -> BackendResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let batch = match &self.inner {
            RedbTx::Read(tx) => collect_range(&tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?, start, end, limit),
            RedbTx::Write(tx) => collect_range(&tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?, start, end, limit),
            RedbTx::Finished => return Err(BackendError::Finished),
        };
        Ok(batch.context(ReadSnafu)?)
    }
}

fn read_value<T>(table: &T, key: &[u8]) -> Result<Option<Vec<u8>>, redb::StorageError>
where T: ReadableTable<&'static [u8], &'static [u8]> {
    Ok(table.get(key)?.map(|guard| guard.value().to_vec()))
}

fn collect_range<T>(
    table: &T,
    start: &[u8],
    end: Option<&[u8]>,
    limit: usize,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, redb::StorageError>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let range = match end {
        Some(end) => table.range(start..end)?,
        None => table.range(start..)?,
    };
    let mut rows = Vec::with_capacity(limit);
    for entry in range.take(limit) {
        let (key, value) = entry?;
        rows.push((key.value().to_vec(), value.value().to_vec()));
    }
    Ok(rows)
}

impl KvTransaction for RedbTransaction {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn get(&self, ctx: &OpContext, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        ensure_live(ctx)?;
        let value = match &self.inner {
            RedbTx::Read(tx) => read_value(&tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?, key),
            RedbTx::Write(tx) => read_value(&tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?, key),
            RedbTx::Finished => return Err(BackendError::Finished),
        };
        Ok(value.context(ReadSnafu)?)
    }

    fn set(&mut self, ctx: &OpContext, key: &[u8], value: &[u8]) -> BackendResult<()> {
        ensure_live(ctx)?;
        let tx = self.write_tx()?;
        let mut table = tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?;
        table.insert(key, value).context(WriteSnafu)?;
        Ok(())
    }

    fn delete(&mut self, ctx: &OpContext, key: &[u8]) -> BackendResult<()> {
        ensure_live(ctx)?;
        let tx = self.write_tx()?;
        let mut table = tx.open_table(ROWS_TABLE).context(OpenTableSnafu)?;
        table.remove(key).context(WriteSnafu)?;
        Ok(())
    }

    fn range<'a>(&'a self, ctx: &OpContext, low: &[u8], high: Option<&[u8]>) -> BackendResult<Box<dyn KvCursor + 'a>> {
        ensure_live(ctx)?;
        if matches!(self.inner, RedbTx::Finished) {
            return Err(BackendError::Finished);
        }
        Ok(Box::new(RedbCursor {
            tx: self,
            next_start: low.to_vec(),
            high: high.map(<[u8]>::to_vec),
            buffer: VecDeque::new(),
            exhausted: is_empty_range(low, high),
        }))
    }

    fn commit(&mut self, ctx: &OpContext) -> BackendResult<()> {
        ensure_live(ctx)?;
        match std::mem::replace(&mut self.inner, RedbTx::Finished) {
            RedbTx::Finished => Err(BackendError::Finished),
            RedbTx::Read(_) => Ok(()),
            RedbTx::Write(tx) => {
                tx.commit().context(CommitSnafu)?;
                debug!("redb transaction committed");
                Ok(())
            }
        }
    }

    fn rollback(self: Box<Self>) {
        if let RedbTx::Write(tx) = self.inner {
            if let Err(err) = tx.abort() {
                warn!(error = %err, "redb transaction abort failed");
            }
        }
        trace!("redb transaction rolled back");
    }
}

// =============================================================================
// Cursor
// =============================================================================

struct RedbCursor<'a> {
    tx: &'a RedbTransaction,
    /// Inclusive start of the next page.
    next_start: Vec<u8>,
    high: Option<Vec<u8>>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl RedbCursor<'_> {
    fn fill(&mut self) -> BackendResult<()> {
        let limit = self.tx.scan_batch_size;
        let page = self.tx.read_batch(&self.next_start, self.high.as_deref(), limit)?;
        if page.len() < limit {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            // Smallest key strictly greater than `last`.
            self.next_start.clear();
            self.next_start.extend_from_slice(last);
            self.next_start.push(0x00);
        }
        trace!(rows = page.len(), exhausted = self.exhausted, "redb cursor page");
        self.buffer.extend(page);
        Ok(())
    }
}

impl KvCursor for RedbCursor<'_> {
    fn next(&mut self, ctx: &OpContext) -> BackendResult<Option<(Vec<u8>, Vec<u8>)>> {
        ensure_live(ctx)?;
        if self.buffer.is_empty() && !self.exhausted {
            self.fill()?;
        }
        Ok(self.buffer.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> OpContext {
        OpContext::background()
    }

    fn put_all(backend: &RedbBackend, keys: &[&[u8]]) {
        let mut tx = backend.begin(&ctx(), TxMode::ReadWrite).unwrap();
        for key in keys {
            tx.set(&ctx(), key, b"v").unwrap();
        }
        tx.commit(&ctx()).unwrap();
    }

    fn scan_keys(backend: &RedbBackend, low: &[u8], high: Option<&[u8]>) -> Vec<Vec<u8>> {
        let tx = backend.begin(&ctx(), TxMode::ReadOnly).unwrap();
        let mut cursor = tx.range(&ctx(), low, high).unwrap();
        let mut keys = Vec::new();
        while let Some((key, _)) = cursor.next(&ctx()).unwrap() {
            keys.push(key);
        }
        keys
    }

    #[test]
    fn test_commit_and_read_back() {
        let backend = RedbBackend::in_memory(16).unwrap();
        put_all(&backend, &[&b"a"[..], b"b"]);
        let tx = backend.begin(&ctx(), TxMode::ReadOnly).unwrap();
        assert_eq!(tx.get(&ctx(), b"a").unwrap(), Some(b"v".to_vec()));
        assert_eq!(tx.get(&ctx(), b"z").unwrap(), None);
    }

    #[test]
    fn test_paging_crosses_batches() {
        let backend = RedbBackend::in_memory(2).unwrap();
        put_all(&backend, &[&b"a"[..], b"a\x00", b"a\x00\x00", b"b", b"c"]);
        assert_eq!(scan_keys(&backend, b"a", None).len(), 5);
        assert_eq!(scan_keys(&backend, b"a", Some(&b"b"[..])), vec![
            b"a".to_vec(),
            b"a\x00".to_vec(),
            b"a\x00\x00".to_vec()
        ]);
    }

    #[test]
    fn test_empty_range() {
        let backend = RedbBackend::in_memory(4).unwrap();
        put_all(&backend, &[&b"a"[..], b"b"]);
        assert!(scan_keys(&backend, b"b", Some(&b"a"[..])).is_empty());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let backend = RedbBackend::in_memory(4).unwrap();
        let mut tx = backend.begin(&ctx(), TxMode::ReadOnly).unwrap();
        assert!(matches!(tx.set(&ctx(), b"k", b"v"), Err(BackendError::ReadOnly)));
    }

    #[test]
    fn test_rollback_discards() {
        let backend = RedbBackend::in_memory(4).unwrap();
        let mut tx = backend.begin(&ctx(), TxMode::ReadWrite).unwrap();
        tx.set(&ctx(), b"k", b"v").unwrap();
        tx.rollback();
        assert!(scan_keys(&backend, b"", None).is_empty());
    }

    #[test]
    fn test_write_transaction_sees_own_writes() {
        let backend = RedbBackend::in_memory(4).unwrap();
        let mut tx = backend.begin(&ctx(), TxMode::ReadWrite).unwrap();
        tx.set(&ctx(), b"k", b"v").unwrap();
        assert_eq!(tx.get(&ctx(), b"k").unwrap(), Some(b"v".to_vec()));
        tx.delete(&ctx(), b"k").unwrap();
        assert_eq!(tx.get(&ctx(), b"k").unwrap(), None);
        tx.rollback();
    }

    #[test]
    fn test_canceled_commit_keeps_transaction() {
        let backend = RedbBackend::in_memory(4).unwrap();
        let canceled = OpContext::background();
        canceled.cancel();
        let mut tx = backend.begin(&ctx(), TxMode::ReadWrite).unwrap();
        tx.set(&ctx(), b"k", b"v").unwrap();
        assert!(matches!(tx.commit(&canceled), Err(BackendError::Canceled)));
        tx.commit(&ctx()).unwrap();
        assert!(matches!(tx.get(&ctx(), b"k"), Err(BackendError::Finished)));
        assert!(matches!(tx.set(&ctx(), b"k", b"w"), Err(BackendError::Finished)));
        drop(tx);
        assert_eq!(scan_keys(&backend, b"", None), vec![b"k".to_vec()]);
    }

    #[test]
    fn test_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuples.redb");
        {
            let backend = RedbBackend::create(&path, 8).unwrap();
            put_all(&backend, &[&b"persisted"[..]]);
        }
        let backend = RedbBackend::create(&path, 8).unwrap();
        assert_eq!(scan_keys(&backend, b"", None), vec![b"persisted".to_vec()]);
    }
}
