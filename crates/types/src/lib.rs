//! Core types for the sync target cache.
//!
//! This crate provides the foundational types shared by the storage and
//! state crates:
//! - Identifier newtypes (`TargetId`, `ListenSequenceNumber`)
//! - Document keys, snapshot versions and the structural query model
//! - Persisted target definitions and the target metadata record
//! - Postcard codec with snafu errors
//! - Configuration types

pub mod codec;
pub mod config;
pub mod query;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use codec::{CodecError, decode, encode};
pub use query::{Direction, FieldFilter, FilterValue, Operator, OrderBy, Query};
pub use types::*;
pub use validation::ValidationError;
