//! Database and transaction management for the sync cache store.
//!
//! Provides atomic transactions over the 5 fixed tables. Uses a single-writer
//! model: the target cache serializes every mutation anyway, so there is no
//! write-write conflict handling.
//!
//! # Example
//!
//! ```no_run
//! use synccache_store::{Database, ReadView, tables};
//!
//! let db = Database::open_in_memory()?;
//!
//! // Write transaction
//! {
//!     let mut txn = db.write()?;
//!     txn.insert::<tables::Targets>(&vec![0x80, 0, 0, 2], &vec![1, 2, 3])?;
//!     txn.commit()?;
//! }
//!
//! // Read transaction
//! {
//!     let txn = db.read()?;
//!     let value = txn.get::<tables::Targets>(&vec![0x80, 0, 0, 2])?;
//!     assert_eq!(value, Some(vec![1, 2, 3]));
//! }
//! # Ok::<(), synccache_store::Error>(())
//! ```

use std::{
    collections::btree_map,
    ops::Bound,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use arc_swap::ArcSwap;
use tracing::debug;

use crate::{
    backend::{FileBackend, InMemoryBackend, StorageBackend, TableMap, decode_image, encode_image},
    error::{Error, Result},
    tables::{Table, TableId},
    types::{Key, Value, encode_key},
};

/// Database configuration options.
#[derive(Debug, Clone, bon::Builder)]
pub struct DatabaseConfig {
    /// Whether to sync on every commit (default true for durability).
    #[builder(default = true)]
    pub sync_on_commit: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { sync_on_commit: true }
    }
}

/// Committed contents of every table at one snapshot.
///
/// Tables are shared between snapshots until a writer modifies them; a write
/// transaction clones only the tables it touches.
#[derive(Debug, Clone, Default)]
pub(crate) struct CommittedState {
    tables: [Arc<TableMap>; TableId::COUNT],
    snapshot_id: u64,
}

/// The main database handle.
///
/// Generic over [`StorageBackend`]. Use [`Database<FileBackend>`] for production
/// and [`Database<InMemoryBackend>`] for testing.
///
/// Thread-safe with interior mutability. Supports concurrent reads
/// and exclusive writes (single-writer model).
///
/// # Transaction Isolation (Copy-on-Write)
///
/// - Read transactions capture an immutable snapshot at start (no locks held)
/// - Write transactions modify private copies of the tables they touch
/// - Atomic pointer swap makes commits visible instantly
///
/// Readers never block writers, and writers never block readers.
pub struct Database<B: StorageBackend> {
    /// Storage backend (file or memory).
    backend: B,
    /// Current committed state (atomically swapped on commit).
    committed_state: ArcSwap<CommittedState>,
    /// Configuration.
    config: DatabaseConfig,
    /// Ensures only one write transaction at a time.
    write_lock: Mutex<()>,
}

impl Database<FileBackend> {
    /// Opens the database stored at `path`, creating it on first commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the image cannot be read.
    /// Returns [`Error::InvalidMagic`] if the file is not a store image.
    /// Returns [`Error::ChecksumMismatch`] or [`Error::Corrupted`] if the image is damaged.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DatabaseConfig::default())
    }

    /// Opens the database stored at `path` with custom configuration.
    ///
    /// # Errors
    ///
    /// Same conditions as [`open`](Self::open).
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: DatabaseConfig) -> Result<Self> {
        let backend = FileBackend::open(path)?;
        Self::from_backend(backend, config)
    }
}

impl Database<InMemoryBackend> {
    /// Creates a new in-memory database.
    ///
    /// Useful for testing and ephemeral workloads. Data is lost on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if backend initialization fails.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_config(DatabaseConfig::default())
    }

    /// Creates a new in-memory database with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if backend initialization fails.
    pub fn open_in_memory_with_config(config: DatabaseConfig) -> Result<Self> {
        Self::from_backend(InMemoryBackend::new(), config)
    }
}

impl<B: StorageBackend> Database<B> {
    /// Creates a database from a backend, loading any persisted image.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted image cannot be read or verified.
    pub fn from_backend(backend: B, config: DatabaseConfig) -> Result<Self> {
        let state = match backend.load()? {
            Some(bytes) => {
                let (snapshot_id, maps) = decode_image(&bytes)?;
                let mut state = CommittedState { snapshot_id, ..CommittedState::default() };
                for (slot, map) in state.tables.iter_mut().zip(maps) {
                    *slot = Arc::new(map);
                }
                debug!(snapshot_id, bytes = bytes.len(), "Loaded store image");
                state
            },
            None => CommittedState::default(),
        };

        Ok(Self {
            backend,
            committed_state: ArcSwap::from_pointee(state),
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the configuration this database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Begin a read transaction.
    ///
    /// The transaction sees a consistent point-in-time view: later commits
    /// are invisible to it.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the signature stable for
    /// backends that need I/O to start a snapshot.
    pub fn read(&self) -> Result<ReadTransaction> {
        Ok(ReadTransaction { snapshot: self.committed_state.load_full() })
    }

    /// Begin a write transaction.
    ///
    /// Only one write transaction can be active at a time. Read transactions
    /// can run concurrently and are unaffected by uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Poisoned`] if the write lock is poisoned.
    pub fn write(&self) -> Result<WriteTransaction<'_, B>> {
        let write_guard = self.write_lock.lock().map_err(|_| Error::Poisoned)?;
        let current = self.committed_state.load_full();

        Ok(WriteTransaction {
            db: self,
            tables: current.tables.clone(),
            snapshot_id: current.snapshot_id + 1,
            modified: false,
            finished: false,
            _write_guard: write_guard,
        })
    }

    /// Returns database statistics.
    pub fn stats(&self) -> DatabaseStats {
        let state = self.committed_state.load();
        DatabaseStats {
            snapshot_id: state.snapshot_id,
            table_entries: TableId::all()
                .iter()
                .map(|id| (id.name(), state.tables[*id as usize].len()))
                .collect(),
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Snapshot id of the latest commit (0 for a fresh database).
    pub snapshot_id: u64,
    /// Entry count per table, in table id order.
    pub table_entries: Vec<(&'static str, usize)>,
}

// ============================================================================
// Read Access
// ============================================================================

/// Read access shared by both transaction kinds.
///
/// A [`WriteTransaction`] reads its own uncommitted changes; a
/// [`ReadTransaction`] reads the snapshot it captured.
pub trait ReadView {
    /// Returns the current contents of a table as seen by this transaction.
    #[doc(hidden)]
    fn table_map(&self, table: TableId) -> &TableMap;

    /// Returns a value by key from a table.
    ///
    /// # Errors
    ///
    /// Infallible for the bundled backends; kept fallible for the storage contract.
    fn get<T: Table>(&self, key: &T::KeyType) -> Result<Option<Vec<u8>>>
    where
        T::KeyType: Key,
    {
        Ok(self.table_map(T::ID).get(&encode_key(key)).cloned())
    }

    /// Checks if a key exists in a table.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get`](Self::get).
    fn contains<T: Table>(&self, key: &T::KeyType) -> Result<bool>
    where
        T::KeyType: Key,
    {
        Ok(self.table_map(T::ID).contains_key(&encode_key(key)))
    }

    /// Returns the number of entries in a table.
    fn entry_count<T: Table>(&self) -> usize {
        self.table_map(T::ID).len()
    }

    /// Iterates over all entries in a table in key order.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get`](Self::get).
    fn iter<T: Table>(&self) -> Result<TableIterator<'_, T>> {
        Ok(TableIterator::new(self.table_map(T::ID), Bound::Unbounded, None))
    }

    /// Iterates over every entry whose encoded key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get`](Self::get).
    fn prefix<T: Table>(&self, prefix: &[u8]) -> Result<TableIterator<'_, T>> {
        Ok(TableIterator::new(
            self.table_map(T::ID),
            Bound::Included(prefix.to_vec()),
            Some(prefix.to_vec()),
        ))
    }
}

/// A read-only transaction.
///
/// Captures an immutable snapshot at creation and can run fully concurrently
/// with write transactions.
pub struct ReadTransaction {
    snapshot: Arc<CommittedState>,
}

impl ReadTransaction {
    /// Returns the snapshot id this transaction reads.
    pub fn snapshot_id(&self) -> u64 {
        self.snapshot.snapshot_id
    }
}

impl ReadView for ReadTransaction {
    fn table_map(&self, table: TableId) -> &TableMap {
        &self.snapshot.tables[table as usize]
    }
}

// ============================================================================
// Write Access
// ============================================================================

/// A read-write transaction.
///
/// # Lifecycle
///
/// 1. On creation, the current table handles are captured and the write lock is taken.
/// 2. Each mutation clones a table on its first write and edits the private copy.
/// 3. On `commit()`, persistent backends receive a complete image of the new
///    state, then the committed state is atomically swapped.
///
/// **Drop behavior:** a `WriteTransaction` dropped without `commit()` discards
/// all changes. The database state remains unchanged.
pub struct WriteTransaction<'db, B: StorageBackend> {
    db: &'db Database<B>,
    /// Table handles, diverging from the committed state as we modify.
    tables: [Arc<TableMap>; TableId::COUNT],
    /// Snapshot id this transaction will publish.
    snapshot_id: u64,
    /// Whether any table was modified.
    modified: bool,
    /// Whether the transaction has been committed or aborted.
    finished: bool,
    /// Guard to ensure only one write transaction at a time.
    _write_guard: MutexGuard<'db, ()>,
}

impl<B: StorageBackend> WriteTransaction<'_, B> {
    /// Inserts or updates a key-value pair.
    ///
    /// # Errors
    ///
    /// Infallible for the bundled backends; kept fallible for the storage contract.
    pub fn insert<T: Table>(&mut self, key: &T::KeyType, value: &T::ValueType) -> Result<()>
    where
        T::KeyType: Key,
        T::ValueType: Value,
    {
        let mut value_bytes = Vec::new();
        value.encode(&mut value_bytes);

        Arc::make_mut(&mut self.tables[T::ID as usize]).insert(encode_key(key), value_bytes);
        self.modified = true;
        Ok(())
    }

    /// Deletes a key from a table. Returns whether the key was present.
    ///
    /// # Errors
    ///
    /// Infallible for the bundled backends; kept fallible for the storage contract.
    pub fn delete<T: Table>(&mut self, key: &T::KeyType) -> Result<bool>
    where
        T::KeyType: Key,
    {
        let key_bytes = encode_key(key);
        if !self.tables[T::ID as usize].contains_key(&key_bytes) {
            return Ok(false);
        }

        Arc::make_mut(&mut self.tables[T::ID as usize]).remove(&key_bytes);
        self.modified = true;
        Ok(true)
    }

    /// Commits the transaction.
    ///
    /// 1. Encode the new state into an image (persistent backends only)
    /// 2. Hand the image to the backend, which replaces the old one atomically
    /// 3. Atomically swap the committed state (makes changes visible in-memory)
    ///
    /// If step 2 fails the committed state is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backend fails to persist the image.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        if !self.modified {
            return Ok(());
        }

        if B::PERSISTENT {
            let image = encode_image(self.snapshot_id, &self.tables)?;
            self.db.backend.persist(&image, self.db.config.sync_on_commit)?;
        }

        let tables = std::mem::take(&mut self.tables);
        self.db
            .committed_state
            .store(Arc::new(CommittedState { tables, snapshot_id: self.snapshot_id }));

        debug!(snapshot_id = self.snapshot_id, "Committed write transaction");
        Ok(())
    }

    /// Aborts the transaction (discard all changes).
    pub fn abort(mut self) {
        self.finished = true;
    }
}

impl<B: StorageBackend> ReadView for WriteTransaction<'_, B> {
    fn table_map(&self, table: TableId) -> &TableMap {
        &self.tables[table as usize]
    }
}

impl<B: StorageBackend> Drop for WriteTransaction<'_, B> {
    fn drop(&mut self) {
        if !self.finished && self.modified {
            debug!(snapshot_id = self.snapshot_id, "Write transaction dropped without commit");
        }
    }
}

// ============================================================================
// Table Iterator
// ============================================================================

/// Ordered iterator over the entries of one table.
///
/// Borrows the transaction it was created from, so it cannot outlive it and
/// a write transaction cannot be mutated while one is alive. Callers that
/// need to mutate what they scan collect the entries first.
pub struct TableIterator<'a, T: Table> {
    inner: Option<btree_map::Range<'a, Vec<u8>, Vec<u8>>>,
    /// When set, iteration stops at the first key without this prefix.
    prefix: Option<Vec<u8>>,
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: Table> TableIterator<'a, T> {
    fn new(map: &'a TableMap, start: Bound<Vec<u8>>, prefix: Option<Vec<u8>>) -> Self {
        let inner = Some(map.range((start, Bound::Unbounded)));
        Self { inner, prefix, _marker: std::marker::PhantomData }
    }

    /// Returns the next entry, returning an explicit `Result`.
    ///
    /// # Errors
    ///
    /// Infallible for the bundled backends; kept fallible for the storage contract.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match inner.next() {
            Some((k, v)) => {
                if self.prefix.as_ref().is_some_and(|prefix| !k.starts_with(prefix)) {
                    self.inner = None;
                    return Ok(None);
                }
                Ok(Some((k.clone(), v.clone())))
            },
            None => {
                self.inner = None;
                Ok(None)
            },
        }
    }

    /// Collects all remaining entries into a `Vec`.
    pub fn collect_entries(mut self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut result = Vec::new();
        while let Ok(Some(entry)) = self.next_entry() {
            result.push(entry);
        }
        result
    }
}

impl<T: Table> Iterator for TableIterator<'_, T> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().ok().flatten()
    }
}
