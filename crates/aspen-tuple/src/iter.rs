//! Forward iteration over a table's rows.

use tracing::warn;

use crate::backend::KvCursor;
use crate::catalog::Table;
use crate::codec::decode_payload;
use crate::context::OpContext;
use crate::error::StoreError;
use crate::error::StoreResult;
use crate::types::Tuple;
use crate::types::Value;

/// Cursor over the rows matched by a scan, in ascending key order.
///
/// Drive it either with [`RangeIter::advance`] and the accessors, or as an
/// [`Iterator`] of `StoreResult<Tuple>`. The first error ends the iteration:
/// `advance` returns `false` and [`RangeIter::error`] reports it. As an
/// `Iterator` the error is moved out as the final `Err` item, so `error()`
/// is empty afterwards; [`RangeIter::failed`] holds in both styles. The
/// backend cursor is released on exhaustion, on error, on
/// [`RangeIter::close`] and on drop.
pub struct RangeIter<'a> {
    cursor: Option<Box<dyn KvCursor + 'a>>,
    table: &'a Table,
    ctx: OpContext,
    current: Option<Tuple>,
    error: Option<StoreError>,
    failed: bool,
    remaining: Option<u64>,
    keys_only: bool,
}

impl<'a> RangeIter<'a> {
    pub(crate) fn new(
        cursor: Box<dyn KvCursor + 'a>,
        table: &'a Table,
        ctx: OpContext,
        limit: Option<u64>,
        keys_only: bool,
    ) -> Self {
        Self {
            cursor: Some(cursor),
            table,
            ctx,
            current: None,
            error: None,
            failed: false,
            remaining: limit,
            keys_only,
        }
    }

    /// Move to the next row. Returns `false` when exhausted or failed.
    pub fn advance(&mut self) -> bool {
        self.current = None;
        if self.cursor.is_none() {
            return false;
        }
        if self.remaining == Some(0) {
            self.close();
            return false;
        }
        match self.step() {
            Ok(Some(tuple)) => {
                self.current = Some(tuple);
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                true
            }
            Ok(None) => {
                self.close();
                false
            }
            Err(err) => {
                warn!(table = %self.table.name(), error = %err, "scan stopped");
                self.error = Some(err);
                self.failed = true;
                self.close();
                false
            }
        }
    }

    fn step(&mut self) -> StoreResult<Option<Tuple>> {
        self.ctx.check()?;
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        let Some((key, value)) = cursor.next(&self.ctx)? else {
            return Ok(None);
        };
        let key = self.table.decode_row_key(&key)?;
        let data = if self.keys_only {
            Vec::new()
        } else {
            decode_payload(self.table.header(), &value)?
        };
        Ok(Some(Tuple::new(key, data)))
    }

    /// Key of the current row.
    pub fn key(&self) -> Option<&[Value]> {
        self.current.as_ref().map(|t| t.key.as_slice())
    }

    /// Payload of the current row. Empty for keys-only scans.
    pub fn data(&self) -> Option<&[Value]> {
        self.current.as_ref().map(|t| t.data.as_slice())
    }

    /// The current row.
    pub fn tuple(&self) -> Option<&Tuple> {
        self.current.as_ref()
    }

    /// The error that ended iteration, if any and not yet yielded by
    /// `Iterator::next`.
    pub fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    /// True if iteration ended with an error, whether or not it was yielded.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Release the backend cursor. Further `advance` calls return `false`.
    pub fn close(&mut self) {
        self.cursor = None;
    }

    /// True once the cursor has been released.
    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }
}

impl Iterator for RangeIter<'_> {
    type Item = StoreResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            return self.current.take().map(Ok);
        }
        self.error.take().map(Err)
    }
}

impl std::fmt::Debug for RangeIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeIter")
            .field("table", &self.table.name())
            .field("closed", &self.cursor.is_none())
            .field("failed", &self.failed)
            .field("remaining", &self.remaining)
            .field("keys_only", &self.keys_only)
            .finish()
    }
}
