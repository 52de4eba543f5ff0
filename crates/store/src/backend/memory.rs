//! In-memory storage backend for testing.

use super::StorageBackend;
use crate::error::Result;

/// In-memory storage backend for testing.
///
/// Committed state lives only in the database's in-memory tables and is lost
/// when the database is dropped.
#[derive(Debug, Default)]
pub struct InMemoryBackend;

impl InMemoryBackend {
    /// Create a new in-memory backend.
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for InMemoryBackend {
    const PERSISTENT: bool = false;

    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn persist(&self, _image: &[u8], _sync: bool) -> Result<()> {
        Ok(())
    }
}
