//! Target and document reference tracking for an offline sync cache.
//!
//! This crate sits on the ordered table store (`synccache-store`) and
//! provides:
//!
//! - Persisted targets with reverse lookup by query
//! - Mirrored target↔document reference indices with per-document sentinels
//! - Membership changes that report documents losing their last reference
//! - Single-pass orphan detection over the sentinel rows
//! - Sequence-bounded eviction and an LRU-style collection pass
//! - Target id and listen sequence number generators

#![deny(unsafe_code)]

mod cache;
mod engine;
mod error;
mod gc;
mod ids;
pub mod keys;
mod metadata;
mod orphans;
mod query_index;
mod references;
mod targets;

pub use cache::{
    OrphanResolution, RemovedTargets, TargetCache, TargetCacheReader, TargetCacheWriter,
    TargetMapping, TargetRead,
};
pub use engine::{EngineError, InMemoryStorageEngine, StorageEngine};
pub use error::{Result, TargetCacheError};
pub use gc::{GcResults, LruGarbageCollector};
pub use ids::{ListenSequence, TargetIdGenerator};
pub use metadata::{MetadataStore, TARGET_GLOBAL_KEY};
pub use orphans::enumerate_orphaned_documents;
pub use query_index::QueryIndex;
pub use references::DocumentReferences;
// Re-export the store's tables for convenience
pub use synccache_store::tables;
pub use targets::TargetStore;
