//! Core type definitions for the sync target cache.
//!
//! - Identifier types (`TargetId`, `ListenSequenceNumber`)
//! - Document keys and snapshot versions
//! - Persisted target definitions and the singleton metadata record

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{query::Query, validation::ValidationError};

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around a numeric type for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for wire format compatibility
/// - `From<inner>` and `Into<inner>` conversions
/// - `Display` with a semantic prefix (e.g., `target:2`)
/// - `new()` constructor and `value()` accessor
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = <$inner as std::str::FromStr>::Err;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<$inner>().map(Self)
            }
        }
    };
}

define_id!(
    /// Process-local identifier of a target (a listened-to query).
    ///
    /// Target ids are strictly positive. Zero is reserved for sentinel rows
    /// in the document-to-target index.
    ///
    /// # Display
    ///
    /// Formats with `target:` prefix: `target:2`.
    TargetId, i32, "target"
);

define_id!(
    /// Monotonic logical clock stamped on every membership-affecting mutation.
    ///
    /// # Display
    ///
    /// Formats with `seq:` prefix: `seq:17`.
    ListenSequenceNumber, i64, "seq"
);

impl TargetId {
    /// Returns true if this id may name a persisted target.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl ListenSequenceNumber {
    /// Marker for "no sequence number", returned when there is nothing to collect.
    pub const INVALID: Self = Self(-1);
}

// ============================================================================
// Snapshot Version
// ============================================================================

/// A server-assigned point in time, carried opaquely through the cache.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SnapshotVersion {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Sub-second nanoseconds (0..1_000_000_000).
    pub nanos: i32,
}

impl SnapshotVersion {
    /// The version of a cache that has never received a remote snapshot.
    pub const NONE: Self = Self { seconds: 0, nanos: 0 };

    /// Creates a snapshot version from its components.
    #[inline]
    pub const fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

// ============================================================================
// Document Key
// ============================================================================

/// Path-like identifier of a document: `collection/doc[/collection/doc...]`.
///
/// Ordering is segment-wise, which matches the byte order of the
/// document's encoded index keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    segments: Vec<String>,
}

impl DocumentKey {
    /// Parses a slash-separated document path.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the path is empty, has an empty segment,
    /// or does not have an even number of segments.
    pub fn from_path(path: &str) -> Result<Self, ValidationError> {
        let segments = path.split('/').map(str::to_string).collect();
        Self::from_segments(segments)
    }

    /// Builds a key from already-split path segments.
    ///
    /// # Errors
    ///
    /// Same conditions as [`DocumentKey::from_path`].
    pub fn from_segments(segments: Vec<String>) -> Result<Self, ValidationError> {
        crate::validation::validate_document_segments(&segments)?;
        Ok(Self { segments })
    }

    /// Returns the path segments.
    #[inline]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the id of the collection containing this document.
    pub fn collection_id(&self) -> &str {
        // Validated keys always have at least two segments.
        &self.segments[self.segments.len() - 2]
    }

    /// Returns the slash-joined path.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl std::str::FromStr for DocumentKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path(s)
    }
}

// ============================================================================
// Target Definitions
// ============================================================================

/// Why a target is being listened to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetPurpose {
    /// A regular user query.
    #[default]
    Listen,
    /// Re-listen after the server reported an existence-filter mismatch.
    ExistenceFilterMismatch,
    /// Resolution of a single document in limbo.
    LimboResolution,
}

/// A persisted target: the query, its id, and its listen state.
///
/// `resume_token` and the snapshot versions are carried through the cache
/// unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct TargetData {
    /// The query this target listens to.
    pub target: Query,
    /// Process-local target identifier.
    pub target_id: TargetId,
    /// Sequence number stamped at the last modification of this target.
    pub sequence_number: ListenSequenceNumber,
    /// Why the target exists.
    #[builder(default)]
    pub purpose: TargetPurpose,
    /// Latest snapshot version received for this target.
    #[builder(default)]
    pub snapshot_version: SnapshotVersion,
    /// Latest snapshot version at which the target had no limbo documents.
    #[builder(default)]
    pub last_limbo_free_snapshot_version: SnapshotVersion,
    /// Opaque server resume token.
    #[builder(default)]
    pub resume_token: Vec<u8>,
}

impl TargetData {
    /// Returns the canonical id of the target's query.
    pub fn canonical_id(&self) -> String {
        self.target.canonical_id()
    }

    /// Returns a copy stamped with a new sequence number.
    #[must_use]
    pub fn with_sequence_number(&self, sequence_number: ListenSequenceNumber) -> Self {
        Self { sequence_number, ..self.clone() }
    }

    /// Returns a copy carrying a new resume token and snapshot version.
    #[must_use]
    pub fn with_resume_token(
        &self,
        resume_token: Vec<u8>,
        snapshot_version: SnapshotVersion,
    ) -> Self {
        Self { resume_token, snapshot_version, ..self.clone() }
    }
}

/// Singleton bookkeeping record for the target cache.
///
/// Invariants maintained by the cache:
/// - `highest_target_id` >= every target id ever stored
/// - `highest_listen_sequence_number` >= every sequence number ever stamped
/// - `target_count` == number of rows in the target table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMetadata {
    /// Highest target id ever added.
    pub highest_target_id: TargetId,
    /// Highest sequence number ever stamped on a target or sentinel.
    pub highest_listen_sequence_number: ListenSequenceNumber,
    /// Snapshot version of the last applied remote event.
    pub last_remote_snapshot_version: SnapshotVersion,
    /// Number of targets currently stored.
    pub target_count: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_prefixes() {
        assert_eq!(TargetId::new(2).to_string(), "target:2");
        assert_eq!(ListenSequenceNumber::new(17).to_string(), "seq:17");
    }

    #[test]
    fn test_target_id_validity() {
        assert!(TargetId::new(1).is_valid());
        assert!(!TargetId::new(0).is_valid());
        assert!(!TargetId::new(-4).is_valid());
    }

    #[test]
    fn test_document_key_parses_even_paths() {
        let key = DocumentKey::from_path("rooms/eros/messages/1").expect("valid path");
        assert_eq!(key.segments().len(), 4);
        assert_eq!(key.collection_id(), "messages");
        assert_eq!(key.to_string(), "rooms/eros/messages/1");
    }

    #[test]
    fn test_document_key_rejects_collection_paths() {
        assert!(DocumentKey::from_path("rooms").is_err());
        assert!(DocumentKey::from_path("rooms/eros/messages").is_err());
    }

    #[test]
    fn test_document_key_rejects_empty_segments() {
        assert!(DocumentKey::from_path("").is_err());
        assert!(DocumentKey::from_path("rooms//messages/1").is_err());
        assert!(DocumentKey::from_path("rooms/eros/").is_err());
    }

    #[test]
    fn test_document_key_ordering_is_segment_wise() {
        let short = DocumentKey::from_path("a/b").unwrap();
        let nested = DocumentKey::from_path("a/b/c/d").unwrap();
        let sibling = DocumentKey::from_path("a/ba").unwrap();
        assert!(short < nested);
        assert!(nested < sibling);
    }

    #[test]
    fn test_snapshot_version_ordering() {
        assert!(SnapshotVersion::NONE < SnapshotVersion::new(0, 1));
        assert!(SnapshotVersion::new(1, 999_999_999) < SnapshotVersion::new(2, 0));
        assert_eq!(SnapshotVersion::new(3, 5).to_string(), "3.000000005");
    }

    #[test]
    fn test_target_data_builder_defaults() {
        let target = TargetData::builder()
            .target(Query::collection("rooms"))
            .target_id(TargetId::new(2))
            .sequence_number(ListenSequenceNumber::new(9))
            .build();

        assert_eq!(target.purpose, TargetPurpose::Listen);
        assert_eq!(target.snapshot_version, SnapshotVersion::NONE);
        assert!(target.resume_token.is_empty());
        assert_eq!(target.canonical_id(), Query::collection("rooms").canonical_id());
    }

    #[test]
    fn test_with_sequence_number_keeps_other_fields() {
        let target = TargetData::builder()
            .target(Query::collection("rooms"))
            .target_id(TargetId::new(2))
            .sequence_number(ListenSequenceNumber::new(9))
            .resume_token(vec![1, 2, 3])
            .build();

        let bumped = target.with_sequence_number(ListenSequenceNumber::new(12));
        assert_eq!(bumped.sequence_number.value(), 12);
        assert_eq!(bumped.resume_token, vec![1, 2, 3]);
        assert_eq!(bumped.target_id, target.target_id);
    }
}
