//! In-process backend over a sorted map.
//!
//! Transactions read from an immutable snapshot of the committed map and
//! buffer their writes in an overlay. Commit is optimistic: it fails with
//! [`BackendError::Conflict`] if any key this transaction read or wrote, or
//! any range it scanned, was changed by a commit made after it began. This
//! gives each committed read-write transaction a serializable view.
//!
//! Per-key write revisions are only kept while some open transaction began
//! before them. Every open transaction registers its begin revision, and
//! history at or below the oldest one is pruned.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use super::BackendError;
use super::BackendResult;
use super::KvBackend;
use super::KvCursor;
use super::KvTransaction;
use super::TxMode;
use super::ensure_live;
use super::is_empty_range;
use crate::context::OpContext;

type Snapshot = Arc<BTreeMap<Vec<u8>, Vec<u8>>>;

struct MemoryState {
    /// Committed data. Replaced copy-on-write while snapshots are held.
    data: Snapshot,
    /// Revision of the last commit that wrote each key, deletes included.
    /// Only revisions newer than [`MemoryState::horizon`] are kept.
    mod_revisions: BTreeMap<Vec<u8>, u64>,
    /// Revision of the last commit.
    revision: u64,
    /// Begin revisions of open transactions, with their counts.
    active: BTreeMap<u64, usize>,
}

impl MemoryState {
    fn register(&mut self, revision: u64) {
        *self.active.entry(revision).or_insert(0) += 1;
    }

    fn release(&mut self, revision: u64) {
        let Some(count) = self.active.get_mut(&revision) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.active.remove(&revision);
            self.prune();
        }
    }

    /// Oldest revision an open transaction reads at, or the current revision
    /// when none is open.
    fn horizon(&self) -> u64 {
        self.active.keys().next().copied().unwrap_or(self.revision)
    }

    /// Forget write revisions no open transaction can conflict with.
    fn prune(&mut self) {
        let horizon = self.horizon();
        let before = self.mod_revisions.len();
        self.mod_revisions.retain(|_, rev| *rev > horizon);
        let pruned = before - self.mod_revisions.len();
        if pruned > 0 {
            trace!(horizon, pruned, "pruned write revisions");
        }
    }
}

/// Thread-safe in-memory backend.
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                data: Arc::new(BTreeMap::new()),
                mod_revisions: BTreeMap::new(),
                revision: 0,
                active: BTreeMap::new(),
            }),
        }
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.state.read().data.len()
    }

    /// True if nothing has been committed, or everything was deleted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Revision of the last commit, 0 before the first.
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }
}

impl KvBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn begin(&self, ctx: &OpContext, mode: TxMode) -> BackendResult<Box<dyn KvTransaction + '_>> {
        ensure_live(ctx)?;
        let mut state = self.state.write();
        let read_revision = state.revision;
        state.register(read_revision);
        trace!(revision = read_revision, ?mode, "memory transaction begin");
        Ok(Box::new(MemoryTransaction {
            backend: self,
            mode,
            snapshot: Arc::clone(&state.data),
            read_revision,
            writes: BTreeMap::new(),
            reads: RefCell::new(ReadSet::default()),
            finished: false,
        }))
    }
}

#[derive(Default)]
struct ReadSet {
    keys: BTreeSet<Vec<u8>>,
    ranges: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

struct MemoryTransaction<'a> {
    backend: &'a MemoryBackend,
    mode: TxMode,
    snapshot: Snapshot,
    read_revision: u64,
    /// Buffered writes; `None` is a delete.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    reads: RefCell<ReadSet>,
    /// Set once `commit` applied or rejected the writes.
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn ensure_open(&self) -> BackendResult<()> {
        if self.finished {
            return Err(BackendError::Finished);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> BackendResult<()> {
        self.ensure_open()?;
        if !self.mode.is_writable() {
            return Err(BackendError::ReadOnly);
        }
        Ok(())
    }

    fn modified_since_begin(&self, state: &MemoryState, key: &[u8]) -> bool {
        state.mod_revisions.get(key).is_some_and(|&rev| rev > self.read_revision)
    }

    fn validate(&self, state: &MemoryState) -> BackendResult<()> {
        let reads = self.reads.borrow();
        if let Some(key) = reads.keys.iter().chain(self.writes.keys()).find(|k| self.modified_since_begin(state, k)) {
            return Err(BackendError::Conflict {
                reason: format!("key {key:02x?} modified since revision {}", self.read_revision),
            });
        }
        for (low, high) in &reads.ranges {
            if is_empty_range(low, high.as_deref()) {
                continue;
            }
            let upper = high.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
            let changed = state
                .mod_revisions
                .range::<[u8], _>((Bound::Included(low.as_slice()), upper))
                .any(|(_, &rev)| rev > self.read_revision);
            if changed {
                return Err(BackendError::Conflict {
                    reason: format!("range starting at {low:02x?} modified since revision {}", self.read_revision),
                });
            }
        }
        Ok(())
    }
}

impl KvTransaction for MemoryTransaction<'_> {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn get(&self, ctx: &OpContext, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        ensure_live(ctx)?;
        self.ensure_open()?;
        self.reads.borrow_mut().keys.insert(key.to_vec());
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }
        Ok(self.snapshot.get(key).cloned())
    }

    fn set(&mut self, ctx: &OpContext, key: &[u8], value: &[u8]) -> BackendResult<()> {
        ensure_live(ctx)?;
        self.ensure_writable()?;
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, ctx: &OpContext, key: &[u8]) -> BackendResult<()> {
        ensure_live(ctx)?;
        self.ensure_writable()?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn range<'a>(&'a self, ctx: &OpContext, low: &[u8], high: Option<&[u8]>) -> BackendResult<Box<dyn KvCursor + 'a>> {
        ensure_live(ctx)?;
        self.ensure_open()?;
        self.reads.borrow_mut().ranges.push((low.to_vec(), high.map(<[u8]>::to_vec)));
        Ok(Box::new(MemoryCursor {
            tx: self,
            low: low.to_vec(),
            high: high.map(<[u8]>::to_vec),
            last: None,
        }))
    }

    fn commit(&mut self, ctx: &OpContext) -> BackendResult<()> {
        ensure_live(ctx)?;
        self.ensure_open()?;
        self.finished = true;
        if self.writes.is_empty() {
            return Ok(());
        }

        let backend = self.backend;
        let mut guard = backend.state.write();
        let state = &mut *guard;
        self.validate(state)?;

        let revision = state.revision + 1;
        let writes = std::mem::take(&mut self.writes);
        let count = writes.len();
        let data = Arc::make_mut(&mut state.data);
        for (key, value) in writes {
            match value {
                Some(value) => data.insert(key.clone(), value),
                None => data.remove(&key),
            };
            state.mod_revisions.insert(key, revision);
        }
        state.revision = revision;
        state.prune();
        debug!(revision, writes = count, "memory transaction committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        trace!(discarded = self.writes.len(), "memory transaction rolled back");
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.backend.state.write().release(self.read_revision);
    }
}

/// Merges the snapshot with the transaction's overlay.
///
/// Each step seeks past the last returned key in both maps, so no iterator
/// borrows outlive a call.
struct MemoryCursor<'a> {
    tx: &'a MemoryTransaction<'a>,
    low: Vec<u8>,
    high: Option<Vec<u8>>,
    last: Option<Vec<u8>>,
}

impl KvCursor for MemoryCursor<'_> {
    fn next(&mut self, ctx: &OpContext) -> BackendResult<Option<(Vec<u8>, Vec<u8>)>> {
        ensure_live(ctx)?;
        if is_empty_range(&self.low, self.high.as_deref()) {
            return Ok(None);
        }
        let tx = self.tx;
        loop {
            let lower = match &self.last {
                Some(last) => Bound::Excluded(last.as_slice()),
                None => Bound::Included(self.low.as_slice()),
            };
            let upper = self.high.as_deref().map_or(Bound::Unbounded, Bound::Excluded);

            let committed = tx.snapshot.range::<[u8], _>((lower, upper)).next();
            let buffered = tx.writes.range::<[u8], _>((lower, upper)).next();
            let (key, value) = match (committed, buffered) {
                (None, None) => return Ok(None),
                (Some((k, v)), None) => (k, Some(v)),
                (None, Some((k, v))) => (k, v.as_ref()),
                (Some((ck, cv)), Some((bk, bv))) => {
                    if bk <= ck {
                        (bk, bv.as_ref())
                    } else {
                        (ck, Some(cv))
                    }
                }
            };

            self.last = Some(key.clone());
            if let Some(value) = value {
                return Ok(Some((key.clone(), value.clone())));
            }
        }
    }
}
