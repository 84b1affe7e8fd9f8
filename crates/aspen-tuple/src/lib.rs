//! Typed tuple tables over an ordered byte key-value backend.
//!
//! A table is described by a [`Header`]: a name, an ordered list of key
//! fields and an ordered list of data fields. Rows are [`Tuple`]s whose key
//! is encoded so that byte order equals tuple order, which makes every key
//! prefix a contiguous range on the backend.
//!
//! # Key Components
//!
//! - **Store**: [`TupleStore`], [`Transaction`], [`TupleTable`], [`RangeIter`]
//! - **Catalog**: [`Table`] entries with never-reused identifiers
//! - **Codecs**: order-preserving key encoding and opaque payload encoding
//! - **Backends**: [`KvBackend`] with an in-memory engine and a redb engine
//! - **Config**: [`StoreConfig`] from environment variables or TOML
//!
//! # Feature Flags
//!
//! - `redb` (default): Include the redb-backed engine
//!
//! # Example
//!
//! ```
//! use aspen_tuple::Header;
//! use aspen_tuple::KeyField;
//! use aspen_tuple::Field;
//! use aspen_tuple::Tuple;
//! use aspen_tuple::TupleStore;
//! use aspen_tuple::Value;
//! use aspen_tuple::ValueType;
//!
//! let store = TupleStore::in_memory();
//! let ctx = store.context();
//! store
//!     .update(&ctx, |tx| {
//!         let header = Header::new(
//!             "users",
//!             vec![KeyField::new("id", ValueType::Int)],
//!             vec![Field::new("name", ValueType::String)],
//!         );
//!         tx.create_table(&ctx, header)?;
//!         let mut users = tx.table(&ctx, "users")?;
//!         users.insert(&ctx, &Tuple::new(vec![Value::Int(1)], vec![Value::from("ada")]))?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let row = store
//!     .view(&ctx, |tx| tx.table(&ctx, "users")?.get(&ctx, &[Value::Int(1)]))
//!     .unwrap();
//! assert_eq!(row.data, vec![Value::from("ada")]);
//! ```

pub mod backend;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod iter;
pub mod store;
pub mod table;
pub mod types;

#[cfg(test)]
mod proptest;

// Backends
pub use backend::BackendError;
pub use backend::KvBackend;
pub use backend::KvCursor;
pub use backend::KvTransaction;
pub use backend::TxMode;
pub use backend::memory::MemoryBackend;
#[cfg(feature = "redb")]
pub use backend::redb::RedbBackend;
// Catalog
pub use catalog::Table;
// Config
pub use config::BackendKind;
pub use config::ConfigError;
pub use config::StoreConfig;
// Context and errors
pub use context::OpContext;
pub use error::StoreError;
pub use error::StoreResult;
// Store
pub use iter::RangeIter;
pub use store::Transaction;
pub use store::TupleStore;
pub use table::ScanOptions;
pub use table::TupleTable;
pub use table::UpdateOptions;
// Types
pub use types::Data;
pub use types::Field;
pub use types::Header;
pub use types::Key;
pub use types::KeyField;
pub use types::KeyPrefix;
pub use types::Timestamp;
pub use types::Tuple;
pub use types::Value;
pub use types::ValueType;
pub use types::prefix_of;
pub use types::sdata;
pub use types::skey;
