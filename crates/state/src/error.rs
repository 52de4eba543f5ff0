//! Error types for the target cache.

use snafu::Snafu;
use synccache_types::{CodecError, TargetId};

/// Target cache error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TargetCacheError {
    /// Underlying storage operation failed.
    #[snafu(display("Storage error: {source}"))]
    Storage {
        /// The underlying store error.
        source: synccache_store::Error,
    },

    /// Codec error during serialization/deserialization.
    #[snafu(display("Codec error: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },

    /// The metadata record is absent after startup.
    #[snafu(display("Target metadata record is missing"))]
    MissingMetadata,

    /// A query index row names a target whose row does not exist.
    #[snafu(display("Query index entry '{canonical_id}' points at missing {target_id}"))]
    DanglingQueryIndex {
        /// Canonical id the index row was found under.
        canonical_id: String,
        /// Target id the index row points at.
        target_id: TargetId,
    },

    /// A target id that cannot name a stored target (zero is reserved for sentinels).
    #[snafu(display("Invalid target id: {target_id}"))]
    InvalidTargetId {
        /// The rejected id.
        target_id: TargetId,
    },

    /// A sentinel row value is not an 8-byte sequence number.
    #[snafu(display("Corrupt sentinel for '{document_key}': {len} bytes"))]
    CorruptSentinel {
        /// Document whose sentinel is damaged.
        document_key: String,
        /// Length of the stored value.
        len: usize,
    },
}

/// Result type for target cache operations.
pub type Result<T> = std::result::Result<T, TargetCacheError>;
