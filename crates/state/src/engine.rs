//! Store lifecycle for the target cache.
//!
//! Opens the underlying [`Database`] from a [`CacheConfig`]:
//! - [`StorageEngine`] persists to the configured file
//! - [`InMemoryStorageEngine`] keeps everything in memory (tests, ephemeral sessions)

use std::sync::Arc;

use snafu::{OptionExt, ResultExt, Snafu};
use synccache_store::{Database, DatabaseConfig, FileBackend, InMemoryBackend};
use synccache_types::config::CacheConfig;
use tracing::info;

/// Error context for opening the store.
#[derive(Debug, Snafu)]
pub enum EngineError {
    /// The store could not be opened.
    #[snafu(display("Failed to open cache store at {path}: {source}"))]
    Open {
        /// Display form of the path (`:memory:` for in-memory stores).
        path: String,
        /// The underlying store error.
        source: synccache_store::Error,
    },

    /// A file-backed store was requested without a path.
    #[snafu(display("Cache config has no path for a file-backed store"))]
    MissingPath,
}

fn database_config(config: &CacheConfig) -> DatabaseConfig {
    DatabaseConfig::builder().sync_on_commit(config.sync_on_commit).build()
}

/// File-backed storage engine.
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<Database<FileBackend>>,
}

impl StorageEngine {
    /// Opens or creates the store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingPath`] if the config names no path.
    /// Returns [`EngineError::Open`] if the existing image cannot be loaded.
    pub fn open(config: &CacheConfig) -> Result<Self, EngineError> {
        let path = config.path.as_deref().context(MissingPathSnafu)?;
        let db = Database::open_with_config(path, database_config(config))
            .context(OpenSnafu { path: path.display().to_string() })?;

        info!(path = %path.display(), sync_on_commit = config.sync_on_commit, "Opened cache store");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a clone of the database handle.
    pub fn db(&self) -> Arc<Database<FileBackend>> {
        Arc::clone(&self.db)
    }
}

/// In-memory storage engine. Contents are lost when the last handle drops.
#[derive(Clone)]
pub struct InMemoryStorageEngine {
    db: Arc<Database<InMemoryBackend>>,
}

impl InMemoryStorageEngine {
    /// Creates an empty in-memory store with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Open`] if backend initialization fails.
    pub fn open() -> Result<Self, EngineError> {
        Self::open_with_config(&CacheConfig::default())
    }

    /// Creates an empty in-memory store. `config.path` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Open`] if backend initialization fails.
    pub fn open_with_config(config: &CacheConfig) -> Result<Self, EngineError> {
        let db = Database::open_in_memory_with_config(database_config(config))
            .context(OpenSnafu { path: ":memory:" })?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a clone of the database handle.
    pub fn db(&self) -> Arc<Database<InMemoryBackend>> {
        Arc::clone(&self.db)
    }
}
