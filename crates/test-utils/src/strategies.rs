//! Proptest strategies for target cache domain types.
//!
//! Strategies produce well-formed values (valid document paths, positive
//! target ids) while exploring edge cases such as segments containing NUL
//! bytes and documents nested under other documents.
//!
//! # Usage
//!
//! ```no_run
//! use synccache_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(ops in strategies::arb_mapping_ops()) {
//!         // apply ops, then check an invariant
//!     }
//! }
//! ```

use std::collections::BTreeSet;

use proptest::prelude::*;
use synccache_types::{
    DocumentKey, FilterValue, ListenSequenceNumber, Operator, Query, TargetData, TargetId,
};

/// Target ids used by [`arb_mapping_ops`].
pub const MAPPING_TARGET_IDS: [i32; 4] = [2, 4, 6, 8];

/// Generates a path segment: short lowercase text, or text with an embedded NUL.
pub fn arb_segment() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-c]{1,3}",
        1 => "[a-c]{0,2}".prop_map(|s| format!("{s}\u{0}")),
    ]
}

/// Generates a document key of one or two collection/document pairs.
pub fn arb_document_key() -> impl Strategy<Value = DocumentKey> {
    proptest::collection::vec((arb_segment(), arb_segment()), 1..=2).prop_filter_map(
        "document paths are always valid",
        |pairs| {
            let segments = pairs.into_iter().flat_map(|(c, d)| [c, d]).collect();
            DocumentKey::from_segments(segments).ok()
        },
    )
}

/// Generates a set of 0-7 arbitrary document keys.
pub fn arb_document_set() -> impl Strategy<Value = BTreeSet<DocumentKey>> {
    proptest::collection::btree_set(arb_document_key(), 0..8)
}

/// Picks a key from a six-document pool, so generated operations overlap.
pub fn arb_pooled_document_key() -> impl Strategy<Value = DocumentKey> {
    prop::sample::select(vec![
        "docs/a", "docs/b", "docs/c", "docs/a/sub/x", "rooms/a", "rooms/b",
    ])
    .prop_filter_map("pool paths are valid", |path| DocumentKey::from_path(path).ok())
}

/// Generates 0-4 keys drawn from the shared pool.
pub fn arb_pooled_document_set() -> impl Strategy<Value = BTreeSet<DocumentKey>> {
    proptest::collection::btree_set(arb_pooled_document_key(), 0..5)
}

/// Generates a collection query with an optional equality filter and limit.
pub fn arb_query() -> impl Strategy<Value = Query> {
    (
        "[a-z]{1,6}",
        proptest::option::of(("[a-z]{1,4}", any::<i64>())),
        proptest::option::of(1u32..100),
    )
        .prop_map(|(collection, filter, limit)| {
            let mut query = Query::collection(&collection);
            if let Some((field, value)) = filter {
                query = query.filter(&field, Operator::Equal, FilterValue::Integer(value));
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            query
        })
}

/// Generates a [`TargetData`] with id 1-999 and sequence number 1-9,999.
pub fn arb_target_data() -> impl Strategy<Value = TargetData> {
    (arb_query(), 1i32..1_000, 1i64..10_000, proptest::collection::vec(any::<u8>(), 0..16))
        .prop_map(|(target, id, seq, resume_token)| {
            TargetData::builder()
                .target(target)
                .target_id(TargetId::new(id))
                .sequence_number(ListenSequenceNumber::new(seq))
                .resume_token(resume_token)
                .build()
        })
}

/// One step of a generated membership-change sequence.
#[derive(Debug, Clone)]
pub enum MappingOp {
    /// Replace the target's document set.
    Reset {
        /// Target being reset.
        target_id: TargetId,
        /// New document set.
        documents: BTreeSet<DocumentKey>,
    },
    /// Incremental change to the target's document set.
    Update {
        /// Target being changed.
        target_id: TargetId,
        /// Documents gaining a reference.
        added: BTreeSet<DocumentKey>,
        /// Documents losing a reference.
        removed: BTreeSet<DocumentKey>,
    },
    /// Remove the target entirely.
    RemoveTarget {
        /// Target being removed.
        target_id: TargetId,
    },
}

impl MappingOp {
    /// Returns the target the step applies to.
    pub fn target_id(&self) -> TargetId {
        match self {
            Self::Reset { target_id, .. }
            | Self::Update { target_id, .. }
            | Self::RemoveTarget { target_id } => *target_id,
        }
    }
}

fn arb_mapping_target_id() -> impl Strategy<Value = TargetId> {
    prop::sample::select(MAPPING_TARGET_IDS.to_vec()).prop_map(TargetId::new)
}

/// Generates a single step over [`MAPPING_TARGET_IDS`] and the pooled documents.
pub fn arb_mapping_op() -> impl Strategy<Value = MappingOp> {
    prop_oneof![
        3 => (arb_mapping_target_id(), arb_pooled_document_set())
            .prop_map(|(target_id, documents)| MappingOp::Reset { target_id, documents }),
        4 => (arb_mapping_target_id(), arb_pooled_document_set(), arb_pooled_document_set())
            .prop_map(|(target_id, added, removed)| {
                MappingOp::Update { target_id, added, removed }
            }),
        1 => arb_mapping_target_id().prop_map(|target_id| MappingOp::RemoveTarget { target_id }),
    ]
}

/// Generates a sequence of 1-24 membership-change steps.
pub fn arb_mapping_ops() -> impl Strategy<Value = Vec<MappingOp>> {
    proptest::collection::vec(arb_mapping_op(), 1..25)
}
