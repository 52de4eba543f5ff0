//! synccache-store: the ordered key-value engine under the sync target cache.
//!
//! A small copy-on-write table store tailored to the target cache:
//!
//! - **Fixed schema**: 5 tables known at compile time
//! - **Single writer**: the cache serializes mutations (no write-write MVCC needed)
//! - **Snapshot reads**: readers see a consistent committed state without locks
//! - **Atomic commits**: all writes of a transaction become visible together
//! - **Checksummed images**: the file backend verifies XXH3-64 on open
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Database API                  │
//! │        (open, read, write, commit)           │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │             Transaction Layer                │
//! │  (ReadTxn: snapshot, WriteTxn: COW+commit)  │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │            Ordered Table Maps                │
//! │      (get, insert, delete, prefix scan)      │
//! └────────────────┬────────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────────┐
//! │            Storage Backend                   │
//! │      (FileBackend / InMemoryBackend)        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use synccache_store::{Database, ReadView};
//! use synccache_store::tables::TargetGlobal;
//!
//! let db = Database::open_in_memory()?;
//!
//! let mut txn = db.write()?;
//! txn.insert::<TargetGlobal>(&"key".to_string(), &b"value".to_vec())?;
//! txn.commit()?;
//!
//! let txn = db.read()?;
//! let value = txn.get::<TargetGlobal>(&"key".to_string())?;
//! # Ok::<(), synccache_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod db;
pub mod error;
pub mod tables;
pub mod types;

// Re-export commonly used types
pub use backend::{FORMAT_VERSION, FileBackend, HEADER_SIZE, InMemoryBackend, MAGIC, StorageBackend};
pub use db::{
    Database, DatabaseConfig, DatabaseStats, ReadTransaction, ReadView, TableIterator,
    WriteTransaction,
};
pub use error::{Error, Result};
pub use tables::{Table, TableId};
pub use types::{Key, KeyType, Value};
