//! Narrow contract over an ordered, transactional byte key-value engine.
//!
//! The tuple layer never interprets backend bytes beyond what the codecs
//! produce and never depends on a concrete engine. Any store that offers
//! transactional get/set/delete and ascending range iteration fits.
//!
//! Isolation and conflict detection belong to the backend. The tuple layer
//! neither strengthens nor weakens them.

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb;

use snafu::Snafu;

use crate::context::OpContext;

/// Keys removed per round by [`delete_range`].
const DELETE_BATCH_SIZE: usize = 1024;

/// Intent declared when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Reads only. Writes fail with [`BackendError::ReadOnly`].
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

impl TxMode {
    /// True for [`TxMode::ReadWrite`].
    pub fn is_writable(self) -> bool {
        matches!(self, TxMode::ReadWrite)
    }
}

/// Errors reported by a storage backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BackendError {
    /// A concurrently committed transaction touched the same keys.
    #[snafu(display("transaction conflict: {reason}"))]
    Conflict {
        /// What conflicted.
        reason: String,
    },

    /// A write was attempted in a read-only transaction.
    #[snafu(display("write attempted in read-only transaction"))]
    ReadOnly,

    /// The caller's context was canceled or its deadline passed.
    #[snafu(display("operation canceled"))]
    Canceled,

    /// The transaction already committed or failed to commit.
    #[snafu(display("transaction already finished"))]
    Finished,

    /// Engine-specific failure.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The engine's error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Fail with [`BackendError::Canceled`] once `ctx` is done.
pub(crate) fn ensure_live(ctx: &OpContext) -> BackendResult<()> {
    if ctx.is_done() {
        return Err(BackendError::Canceled);
    }
    Ok(())
}

/// Delete every key in `[low, high)`, returning how many were removed.
///
/// Keys are collected a batch at a time because a cursor borrows the
/// transaction. Deleted keys drop out of the next batch's range scan, which
/// always restarts at `low`.
pub(crate) fn delete_range(
    tx: &mut dyn KvTransaction,
    ctx: &OpContext,
    low: &[u8],
    high: Option<&[u8]>,
) -> BackendResult<u64> {
    let mut deleted = 0u64;
    loop {
        let batch = {
            let mut cursor = tx.range(ctx, low, high)?;
            let mut keys = Vec::with_capacity(DELETE_BATCH_SIZE);
            while keys.len() < DELETE_BATCH_SIZE {
                match cursor.next(ctx)? {
                    Some((key, _)) => keys.push(key),
                    None => break,
                }
            }
            keys
        };
        if batch.is_empty() {
            return Ok(deleted);
        }
        for key in &batch {
            tx.delete(ctx, key)?;
        }
        deleted += batch.len() as u64;
    }
}

/// True when `[low, high)` cannot contain any key.
pub(crate) fn is_empty_range(low: &[u8], high: Option<&[u8]>) -> bool {
    high.is_some_and(|high| high <= low)
}

// =============================================================================
// Traits
// =============================================================================

/// A storage engine that hands out transactions.
pub trait KvBackend: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Begin a transaction.
    fn begin(&self, ctx: &OpContext, mode: TxMode) -> BackendResult<Box<dyn KvTransaction + '_>>;
}

/// One backend transaction.
///
/// Not safe for concurrent use: every call, cursor steps included, is made
/// sequentially by a single owner. Dropping without `commit` rolls back.
/// Calls made after a finished `commit` fail with [`BackendError::Finished`].
pub trait KvTransaction {
    /// Mode the transaction was opened with.
    fn mode(&self) -> TxMode;

    /// Value stored under `key`, seeing this transaction's own writes.
    fn get(&self, ctx: &OpContext, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, ctx: &OpContext, key: &[u8], value: &[u8]) -> BackendResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&mut self, ctx: &OpContext, key: &[u8]) -> BackendResult<()>;

    /// Ascending cursor over keys in `[low, high)`. `None` means no upper bound.
    fn range<'a>(&'a self, ctx: &OpContext, low: &[u8], high: Option<&[u8]>) -> BackendResult<Box<dyn KvCursor + 'a>>;

    /// Make the transaction's writes durable and visible.
    ///
    /// [`BackendError::Canceled`] is only returned before anything was
    /// applied, and the transaction stays usable for `rollback`. After any
    /// other outcome the transaction is finished and must be dropped.
    fn commit(&mut self, ctx: &OpContext) -> BackendResult<()>;

    /// Discard the transaction's writes.
    fn rollback(self: Box<Self>);
}

/// Forward cursor over a key range.
pub trait KvCursor {
    /// Next pair in ascending key order, `None` at the end of the range.
    fn next(&mut self, ctx: &OpContext) -> BackendResult<Option<(Vec<u8>, Vec<u8>)>>;
}
