//! Cancellation and deadlines for store operations.

use std::time::Duration;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::error::StoreResult;

/// Cancellation signal carried by every store operation.
///
/// An operation checks its context before and after each backend call and
/// fails with [`StoreError::Canceled`] once the token fires or the deadline
/// passes. Cloning shares the same token.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never canceled unless [`OpContext::cancel`] is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_in(timeout)
    }

    /// A context driven by an existing token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }

    /// A context canceled when this one is, which can also be canceled on
    /// its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Tighten the deadline to at most `timeout` from now.
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        self.deadline = match (self.deadline, candidate) {
            (Some(current), Some(candidate)) => Some(current.min(candidate)),
            (current, candidate) => current.or(candidate),
        };
        self
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and every child.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once canceled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with [`StoreError::Canceled`] once done.
    pub fn check(&self) -> StoreResult<()> {
        if self.is_done() {
            return Err(StoreError::Canceled);
        }
        Ok(())
    }
}
