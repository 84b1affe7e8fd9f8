//! Error taxonomy for tuple store operations.
//!
//! Codec and schema errors are detected before anything is written. Backend
//! errors pass through untouched and are never retried here.

use snafu::Snafu;

use crate::backend::BackendError;
use crate::codec::CodecError;
use crate::config::ConfigError;

/// Errors returned by catalog, transaction, table and iterator operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// A table or row does not exist.
    #[snafu(display("{what} not found"))]
    NotFound {
        /// Human readable description of the missing item.
        what: String,
    },

    /// A table name or row key is already taken.
    #[snafu(display("{what} already exists"))]
    AlreadyExists {
        /// Human readable description of the conflicting item.
        what: String,
    },

    /// Field count or type disagrees with the table header.
    #[snafu(display("schema mismatch: {reason}"))]
    SchemaMismatch {
        /// What did not match.
        reason: String,
    },

    /// Stored bytes could not be decoded.
    #[snafu(display("encoding error: {source}"))]
    Encoding {
        /// The underlying codec error.
        source: CodecError,
    },

    /// The transaction was already committed or rolled back.
    #[snafu(display("transaction is closed"))]
    TransactionClosed,

    /// The cancellation token fired or the deadline passed.
    #[snafu(display("operation canceled"))]
    Canceled,

    /// Opaque failure reported by the storage backend.
    #[snafu(display("backend error: {source}"))]
    Backend {
        /// The underlying backend error.
        source: BackendError,
    },

    /// The store could not be opened with the given configuration.
    #[snafu(display("configuration error: {source}"))]
    Config {
        /// The underlying configuration error.
        source: ConfigError,
    },
}

/// Result type for tuple store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Shorthand for a schema mismatch with a formatted reason.
    pub(crate) fn schema(reason: impl Into<String>) -> Self {
        StoreError::SchemaMismatch { reason: reason.into() }
    }

    /// True for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for [`StoreError::AlreadyExists`].
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    /// True for [`StoreError::Canceled`].
    pub fn is_canceled(&self) -> bool {
        matches!(self, StoreError::Canceled)
    }
}

impl From<CodecError> for StoreError {
    fn from(source: CodecError) -> Self {
        StoreError::Encoding { source }
    }
}

impl From<ConfigError> for StoreError {
    fn from(source: ConfigError) -> Self {
        StoreError::Config { source }
    }
}

impl From<BackendError> for StoreError {
    fn from(source: BackendError) -> Self {
        match source {
            BackendError::Canceled => StoreError::Canceled,
            source => StoreError::Backend { source },
        }
    }
}
