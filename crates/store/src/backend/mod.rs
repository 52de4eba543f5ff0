//! Storage backend abstraction for the store engine.
//!
//! The backend trait abstracts where committed state lives, allowing both
//! file-based (production) and in-memory (testing) implementations.
//!
//! # Crash Safety: Whole-Image Replace
//!
//! A persistent backend stores one self-describing image of every table:
//! - A fixed header carries the magic, format version, snapshot id and an
//!   XXH3-64 checksum of the body
//! - Each commit writes a complete new image beside the old one, syncs it,
//!   then atomically renames it over the old one
//! - On open the header and checksum are verified before any table is loaded
//!
//! A crash at any point leaves either the old image or the new image in place,
//! never a mix of both.

mod file;
mod image;
mod memory;

pub use file::FileBackend;
pub use image::{ImageHeader, TableMap, decode_image, encode_image};
pub use memory::InMemoryBackend;

use crate::error::Result;

/// Image header size in bytes.
/// Layout: magic(8) + version(2) + reserved(6) + snapshot_id(8) + body_len(8) + checksum(8).
pub const HEADER_SIZE: usize = 40;

/// Magic number for store image files.
pub const MAGIC: &[u8; 8] = b"SYNCACHE";

/// Current image format version.
pub const FORMAT_VERSION: u16 = 1;

/// Storage backend trait for abstracting durable I/O.
pub trait StorageBackend: Send + Sync {
    /// Whether committed images must be handed to [`persist`](Self::persist).
    ///
    /// Non-persistent backends let the database skip image encoding entirely.
    const PERSISTENT: bool;

    /// Reads the last persisted image, or `None` if nothing was ever persisted.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the read fails.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Durably replaces the persisted image.
    ///
    /// When `sync` is true the image must be on stable storage before this returns.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if writing, syncing or renaming fails.
    fn persist(&self, image: &[u8], sync: bool) -> Result<()>;
}
