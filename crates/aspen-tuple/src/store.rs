//! Store handle and transactions.
//!
//! A [`TupleStore`] wraps one backend. Every read or write happens inside a
//! [`Transaction`], which owns the backend transaction until it is committed
//! or rolled back. After that every call fails with
//! [`StoreError::TransactionClosed`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use crate::backend::BackendError;
use crate::backend::KvBackend;
use crate::backend::KvTransaction;
use crate::backend::TxMode;
use crate::backend::memory::MemoryBackend;
#[cfg(feature = "redb")]
use crate::backend::redb::RedbBackend;
use crate::catalog;
use crate::catalog::Table;
use crate::config::BackendKind;
use crate::config::ConfigError;
use crate::config::StoreConfig;
use crate::context::OpContext;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::table::TupleTable;
use crate::types::Header;

/// Handle to a tuple store. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct TupleStore {
    backend: Arc<dyn KvBackend>,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for TupleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TupleStore")
            .field("backend", &self.backend.name())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl TupleStore {
    /// Wrap a backend.
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self::from_backend(Arc::new(backend))
    }

    /// Wrap a shared backend.
    pub fn from_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            default_timeout: None,
        }
    }

    /// A store over a fresh [`MemoryBackend`].
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Open the backend described by `config`.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid, `Backend` if the engine
    /// cannot be opened.
    #[instrument(skip(config), fields(backend = ?config.backend))]
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let store = match config.backend {
            BackendKind::Memory => Self::in_memory(),
            #[cfg(feature = "redb")]
            BackendKind::Redb => {
                let path = config.path.as_ref().ok_or_else(|| ConfigError::MissingRequired {
                    key: "path".to_string(),
                    hint: "the redb backend needs a database file".to_string(),
                })?;
                Self::new(RedbBackend::create(path, config.scan_batch_size)?)
            }
            #[cfg(not(feature = "redb"))]
            BackendKind::Redb => {
                return Err(ConfigError::InvalidValue {
                    key: "backend".to_string(),
                    value: "redb".to_string(),
                    reason: "built without the redb feature".to_string(),
                }
                .into());
            }
        };
        debug!(backend = store.backend.name(), "opened tuple store");
        Ok(store.with_default_timeout(config.default_timeout()))
    }

    /// Apply `timeout` to contexts made by [`TupleStore::context`].
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// A fresh context carrying the default timeout, if one is configured.
    pub fn context(&self) -> OpContext {
        match self.default_timeout {
            Some(timeout) => OpContext::with_timeout(timeout),
            None => OpContext::background(),
        }
    }

    /// Short name of the backend engine.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Begin a transaction.
    pub fn begin(&self, ctx: &OpContext, mode: TxMode) -> StoreResult<Transaction<'_>> {
        ctx.check()?;
        let inner = self.backend.begin(ctx, mode)?;
        trace!(backend = self.backend.name(), ?mode, "began transaction");
        Ok(Transaction {
            inner: Some(inner),
            mode,
        })
    }

    /// Run `f` in a read-only transaction, rolled back afterwards.
    pub fn view<T>(
        &self,
        ctx: &OpContext,
        f: impl FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tx = self.begin(ctx, TxMode::ReadOnly)?;
        let result = f(&mut tx);
        if tx.is_open() {
            tx.rollback()?;
        }
        result
    }

    /// Run `f` in a read-write transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    pub fn update<T>(
        &self,
        ctx: &OpContext,
        f: impl FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tx = self.begin(ctx, TxMode::ReadWrite)?;
        match f(&mut tx) {
            Ok(value) => {
                if let Err(err) = tx.commit(ctx) {
                    if tx.is_open() {
                        tx.rollback()?;
                    }
                    return Err(err);
                }
                Ok(value)
            }
            Err(err) => {
                if tx.is_open() {
                    tx.rollback()?;
                }
                Err(err)
            }
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// An open unit of work against the store.
///
/// Dropping an open transaction rolls it back.
pub struct Transaction<'s> {
    inner: Option<Box<dyn KvTransaction + 's>>,
    mode: TxMode,
}

impl<'s> Transaction<'s> {
    /// Mode the transaction was opened with.
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// False once committed or rolled back.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn kv(&self) -> StoreResult<&(dyn KvTransaction + 's)> {
        self.inner.as_deref().ok_or(StoreError::TransactionClosed)
    }

    fn kv_mut(&mut self) -> StoreResult<&mut (dyn KvTransaction + 's)> {
        self.inner.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }

    /// Create a table from `header`.
    pub fn create_table(&mut self, ctx: &OpContext, header: Header) -> StoreResult<Table> {
        catalog::create_table(self.kv_mut()?, ctx, header)
    }

    /// Look up a table by name.
    pub fn get_table(&self, ctx: &OpContext, name: &str) -> StoreResult<Table> {
        catalog::get_table(self.kv()?, ctx, name)
    }

    /// Every table, in name order.
    pub fn list_tables(&self, ctx: &OpContext) -> StoreResult<Vec<Table>> {
        catalog::list_tables(self.kv()?, ctx)
    }

    /// Delete a table and its rows. Returns the number of rows removed.
    pub fn drop_table(&mut self, ctx: &OpContext, name: &str) -> StoreResult<u64> {
        catalog::drop_table(self.kv_mut()?, ctx, name)
    }

    /// Open a table by name for row operations.
    pub fn table(&mut self, ctx: &OpContext, name: &str) -> StoreResult<TupleTable<'_>> {
        let table = self.get_table(ctx, name)?;
        Ok(TupleTable::new(self.kv_mut()?, table))
    }

    /// Open an already resolved table for row operations.
    ///
    /// The table is not looked up again; rows written for a table dropped in
    /// the meantime are orphaned under its never-reused identifier.
    pub fn open_table(&mut self, table: Table) -> StoreResult<TupleTable<'_>> {
        Ok(TupleTable::new(self.kv_mut()?, table))
    }

    /// Commit and close the transaction.
    ///
    /// A canceled `ctx` fails with `Canceled` and leaves the transaction
    /// open so it can still be rolled back. Any other failure closes it.
    pub fn commit(&mut self, ctx: &OpContext) -> StoreResult<()> {
        ctx.check()?;
        let inner = self.inner.as_mut().ok_or(StoreError::TransactionClosed)?;
        match inner.commit(ctx) {
            Ok(()) => {
                self.inner = None;
                trace!(mode = ?self.mode, "committed transaction");
                Ok(())
            }
            Err(BackendError::Canceled) => {
                debug!(mode = ?self.mode, "commit canceled, transaction still open");
                Err(StoreError::Canceled)
            }
            Err(err) => {
                self.inner = None;
                debug!(error = %err, "commit failed");
                Err(err.into())
            }
        }
    }

    /// Discard all writes and close the transaction.
    pub fn rollback(&mut self) -> StoreResult<()> {
        let inner = self.inner.take().ok_or(StoreError::TransactionClosed)?;
        inner.rollback();
        trace!(mode = ?self.mode, "rolled back transaction");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            warn!(mode = ?self.mode, "transaction dropped while open, rolling back");
            inner.rollback();
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("open", &self.inner.is_some())
            .finish()
    }
}
