//! Key encoding for the target cache tables.
//!
//! Every composite key is built from order-preserving components so that the
//! byte order of encoded keys equals the intended iteration order:
//!
//! - integers: big-endian with the sign bit flipped
//! - strings: `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x01`
//! - document paths: each segment as `0x02` followed by an escaped string,
//!   closed by a single `0x01`
//!
//! Because every string is terminated and every path is closed, no encoded
//! component is a byte prefix of a different component of the same kind.
//!
//! Table key formats:
//! - Targets: `{target_id}`
//! - TargetQueries: `{canonical_id}{target_id}`
//! - TargetDocuments: `{target_id}{path}`
//! - DocumentTargets: `{path}{target_id}` (target id 0 marks the sentinel row)

use synccache_types::{DocumentKey, TargetId};

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;
const SEGMENT_TAG: u8 = 0x02;
const PATH_END: u8 = 0x01;

/// Target id stored in the sentinel row of each document.
pub const SENTINEL_TARGET_ID: TargetId = TargetId::new(0);

// ============================================================================
// Component encoders
// ============================================================================

fn write_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&((value as u32) ^ (1u32 << 31)).to_be_bytes());
}

fn read_i32(buf: &[u8]) -> Option<(i32, &[u8])> {
    let (head, rest) = buf.split_first_chunk::<4>()?;
    Some(((u32::from_be_bytes(*head) ^ (1u32 << 31)) as i32, rest))
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    for &byte in value.as_bytes() {
        buf.push(byte);
        if byte == ESCAPE {
            buf.push(ESCAPED_NUL);
        }
    }
    buf.push(ESCAPE);
    buf.push(TERMINATOR);
}

fn read_string(buf: &[u8]) -> Option<(String, &[u8])> {
    let mut out = Vec::new();
    let mut i = 0;
    loop {
        match *buf.get(i)? {
            ESCAPE => match *buf.get(i + 1)? {
                ESCAPED_NUL => out.push(ESCAPE),
                TERMINATOR => {
                    let value = String::from_utf8(out).ok()?;
                    return Some((value, &buf[i + 2..]));
                },
                _ => return None,
            },
            byte => {
                out.push(byte);
                i += 1;
                continue;
            },
        }
        i += 2;
    }
}

fn write_path(buf: &mut Vec<u8>, key: &DocumentKey) {
    for segment in key.segments() {
        buf.push(SEGMENT_TAG);
        write_string(buf, segment);
    }
    buf.push(PATH_END);
}

fn read_path(mut buf: &[u8]) -> Option<(DocumentKey, &[u8])> {
    let mut segments = Vec::new();
    loop {
        let (&tag, rest) = buf.split_first()?;
        match tag {
            SEGMENT_TAG => {
                let (segment, rest) = read_string(rest)?;
                segments.push(segment);
                buf = rest;
            },
            PATH_END => {
                let key = DocumentKey::from_segments(segments).ok()?;
                return Some((key, rest));
            },
            _ => return None,
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Encodes the Targets row key for a target.
pub fn target_key(target_id: TargetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(4);
    write_i32(&mut key, target_id.value());
    key
}

/// Decodes a Targets row key.
pub fn decode_target_key(key: &[u8]) -> Option<TargetId> {
    match read_i32(key)? {
        (id, []) => Some(TargetId::new(id)),
        _ => None,
    }
}

// ============================================================================
// TargetQueries
// ============================================================================

/// Decoded TargetQueries row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTargetKey {
    /// Canonical id of the target's query.
    pub canonical_id: String,
    /// Target registered under that canonical id.
    pub target_id: TargetId,
}

/// Prefix of every TargetQueries row for one canonical id.
pub fn query_target_prefix(canonical_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(canonical_id.len() + 2);
    write_string(&mut key, canonical_id);
    key
}

/// Encodes a TargetQueries row key.
pub fn query_target_key(canonical_id: &str, target_id: TargetId) -> Vec<u8> {
    let mut key = query_target_prefix(canonical_id);
    write_i32(&mut key, target_id.value());
    key
}

/// Decodes a TargetQueries row key.
pub fn decode_query_target_key(key: &[u8]) -> Option<QueryTargetKey> {
    let (canonical_id, rest) = read_string(key)?;
    match read_i32(rest)? {
        (id, []) => Some(QueryTargetKey { canonical_id, target_id: TargetId::new(id) }),
        _ => None,
    }
}

// ============================================================================
// TargetDocuments
// ============================================================================

/// Decoded TargetDocuments row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDocumentKey {
    /// Referencing target.
    pub target_id: TargetId,
    /// Referenced document.
    pub document_key: DocumentKey,
}

/// Prefix of every TargetDocuments row for one target.
pub fn target_documents_prefix(target_id: TargetId) -> Vec<u8> {
    target_key(target_id)
}

/// Encodes a TargetDocuments row key.
pub fn target_document_key(target_id: TargetId, document_key: &DocumentKey) -> Vec<u8> {
    let mut key = target_documents_prefix(target_id);
    write_path(&mut key, document_key);
    key
}

/// Decodes a TargetDocuments row key.
pub fn decode_target_document_key(key: &[u8]) -> Option<TargetDocumentKey> {
    let (id, rest) = read_i32(key)?;
    match read_path(rest)? {
        (document_key, []) => {
            Some(TargetDocumentKey { target_id: TargetId::new(id), document_key })
        },
        _ => None,
    }
}

// ============================================================================
// DocumentTargets
// ============================================================================

/// Decoded DocumentTargets row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTargetKey {
    /// Referenced document.
    pub document_key: DocumentKey,
    /// Referencing target, or [`SENTINEL_TARGET_ID`] for the sentinel row.
    pub target_id: TargetId,
}

impl DocumentTargetKey {
    /// Returns true for the document's sentinel row.
    pub fn is_sentinel(&self) -> bool {
        self.target_id == SENTINEL_TARGET_ID
    }
}

/// Prefix of every DocumentTargets row for one document.
pub fn document_targets_prefix(document_key: &DocumentKey) -> Vec<u8> {
    let mut key = Vec::new();
    write_path(&mut key, document_key);
    key
}

/// Encodes a DocumentTargets row key.
pub fn document_target_key(document_key: &DocumentKey, target_id: TargetId) -> Vec<u8> {
    let mut key = document_targets_prefix(document_key);
    write_i32(&mut key, target_id.value());
    key
}

/// Encodes the sentinel row key of a document.
pub fn sentinel_key(document_key: &DocumentKey) -> Vec<u8> {
    document_target_key(document_key, SENTINEL_TARGET_ID)
}

/// Decodes a DocumentTargets row key.
pub fn decode_document_target_key(key: &[u8]) -> Option<DocumentTargetKey> {
    let (document_key, rest) = read_path(key)?;
    match read_i32(rest)? {
        (id, []) => Some(DocumentTargetKey { document_key, target_id: TargetId::new(id) }),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use proptest::prelude::*;
    use synccache_test_utils::strategies::arb_document_key;

    use super::*;

    fn doc(path: &str) -> DocumentKey {
        DocumentKey::from_path(path).expect("valid path")
    }

    #[test]
    fn test_integer_encoding_is_sign_flipped_big_endian() {
        assert_eq!(target_key(TargetId::new(0)), vec![0x80, 0, 0, 0]);
        assert_eq!(target_key(TargetId::new(2)), vec![0x80, 0, 0, 2]);
        assert_eq!(target_key(TargetId::new(-1)), vec![0x7F, 0xFF, 0xFF, 0xFF]);
        assert!(target_key(TargetId::new(-5)) < target_key(TargetId::new(3)));
    }

    #[test]
    fn test_string_escapes_nul_and_terminates() {
        assert_eq!(query_target_prefix("a\0b"), vec![b'a', 0x00, 0xFF, b'b', 0x00, 0x01]);
        assert_eq!(query_target_prefix(""), vec![0x00, 0x01]);
    }

    #[test]
    fn test_path_layout() {
        let encoded = document_targets_prefix(&doc("c/d"));
        assert_eq!(encoded, vec![0x02, b'c', 0x00, 0x01, 0x02, b'd', 0x00, 0x01, 0x01]);
    }

    #[test]
    fn test_canonical_id_prefix_does_not_match_longer_id() {
        let prefix = query_target_prefix("rooms");
        let other = query_target_key("rooms|l:1", TargetId::new(2));
        assert!(!other.starts_with(&prefix));
        assert!(query_target_key("rooms", TargetId::new(2)).starts_with(&prefix));
    }

    #[test]
    fn test_document_prefix_does_not_match_child_document() {
        let parent = document_targets_prefix(&doc("rooms/eros"));
        let child = document_target_key(&doc("rooms/eros/messages/1"), TargetId::new(2));
        assert!(!child.starts_with(&parent));
    }

    #[test]
    fn test_sentinel_row_sorts_first_for_document() {
        let key = doc("rooms/eros");
        let sentinel = sentinel_key(&key);
        let reference = document_target_key(&key, TargetId::new(1));
        assert!(sentinel < reference);
        assert!(decode_document_target_key(&sentinel).expect("decode").is_sentinel());
        assert!(!decode_document_target_key(&reference).expect("decode").is_sentinel());
    }

    #[test]
    fn test_decoders_recover_components() {
        let key = doc("a/b/c/d");
        assert_eq!(decode_target_key(&target_key(TargetId::new(42))), Some(TargetId::new(42)));
        assert_eq!(
            decode_query_target_key(&query_target_key("x\0y", TargetId::new(4))),
            Some(QueryTargetKey { canonical_id: "x\0y".to_string(), target_id: TargetId::new(4) })
        );
        assert_eq!(
            decode_target_document_key(&target_document_key(TargetId::new(6), &key)),
            Some(TargetDocumentKey { target_id: TargetId::new(6), document_key: key.clone() })
        );
        assert_eq!(
            decode_document_target_key(&document_target_key(&key, TargetId::new(8))),
            Some(DocumentTargetKey { document_key: key, target_id: TargetId::new(8) })
        );
    }

    #[test]
    fn test_malformed_keys_decode_to_none() {
        assert_eq!(decode_target_key(&[0x80, 0, 0]), None);
        assert_eq!(decode_target_key(&[0x80, 0, 0, 1, 9]), None);
        assert_eq!(decode_query_target_key(&[b'a', 0x00]), None);
        assert_eq!(decode_query_target_key(&[b'a', 0x00, 0x07, 0x80, 0, 0, 1]), None);
        assert_eq!(decode_document_target_key(&[0x05]), None);
        // Odd segment count is a collection path, not a document.
        let mut collection = vec![SEGMENT_TAG];
        write_string(&mut collection, "rooms");
        collection.push(PATH_END);
        write_i32(&mut collection, 1);
        assert_eq!(decode_document_target_key(&collection), None);
    }

    proptest! {
        #[test]
        fn path_encoding_preserves_order(a in arb_document_key(), b in arb_document_key()) {
            let ea = document_targets_prefix(&a);
            let eb = document_targets_prefix(&b);
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn reference_rows_stay_under_document_prefix(
            a in arb_document_key(),
            b in arb_document_key(),
            id in 1i32..1000,
        ) {
            let row = document_target_key(&a, TargetId::new(id));
            prop_assert!(row.starts_with(&document_targets_prefix(&a)));
            if a != b {
                prop_assert!(!row.starts_with(&document_targets_prefix(&b)));
            }
        }

        #[test]
        fn string_encoding_preserves_order(a in ".{0,8}", b in ".{0,8}") {
            prop_assert_eq!(a.cmp(&b), query_target_prefix(&a).cmp(&query_target_prefix(&b)));
        }

        #[test]
        fn integer_encoding_preserves_order(a in any::<i32>(), b in any::<i32>()) {
            prop_assert_eq!(
                a.cmp(&b),
                target_key(TargetId::new(a)).cmp(&target_key(TargetId::new(b)))
            );
        }
    }
}
