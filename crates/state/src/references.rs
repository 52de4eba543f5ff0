//! Target-document reference indices and per-document sentinel rows.
//!
//! Each reference `(target, document)` is stored twice, once per direction:
//! - TargetDocuments: `{target_id}{path}` -> empty
//! - DocumentTargets: `{path}{target_id}` -> empty
//!
//! Both rows are always written and deleted in the same transaction.
//!
//! The DocumentTargets row with target id 0 is the document's sentinel. Its
//! value is the 8-byte big-endian sequence number at which the document's
//! reference set last changed. Sentinels are independent of the reference
//! count: a document keeps its sentinel after losing its last reference until
//! orphan resolution deletes it.

use std::collections::BTreeSet;

use snafu::ResultExt;
use synccache_store::{ReadView, StorageBackend, WriteTransaction, tables};
use synccache_types::{DocumentKey, ListenSequenceNumber, TargetId};
use tracing::warn;

use crate::{
    error::{CorruptSentinelSnafu, Result, StorageSnafu},
    keys::{
        decode_document_target_key, decode_target_document_key, document_target_key,
        document_targets_prefix, sentinel_key, target_document_key, target_documents_prefix,
    },
};

/// Reference and sentinel storage operations.
pub struct DocumentReferences;

impl DocumentReferences {
    /// Writes both rows of a reference.
    pub fn add<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        target_id: TargetId,
        document_key: &DocumentKey,
    ) -> Result<()> {
        txn.insert::<tables::TargetDocuments>(
            &target_document_key(target_id, document_key),
            &Vec::new(),
        )
        .context(StorageSnafu)?;
        txn.insert::<tables::DocumentTargets>(
            &document_target_key(document_key, target_id),
            &Vec::new(),
        )
        .context(StorageSnafu)
    }

    /// Deletes both rows of a reference. Returns true if the reference existed.
    pub fn remove<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        target_id: TargetId,
        document_key: &DocumentKey,
    ) -> Result<bool> {
        let forward = txn
            .delete::<tables::TargetDocuments>(&target_document_key(target_id, document_key))
            .context(StorageSnafu)?;
        let reverse = txn
            .delete::<tables::DocumentTargets>(&document_target_key(document_key, target_id))
            .context(StorageSnafu)?;
        Ok(forward || reverse)
    }

    /// Returns every document referenced by a target.
    ///
    /// A row whose key does not decode ends the scan.
    pub fn documents_for_target<V: ReadView>(
        view: &V,
        target_id: TargetId,
    ) -> Result<BTreeSet<DocumentKey>> {
        let prefix = target_documents_prefix(target_id);
        let mut iter = view.prefix::<tables::TargetDocuments>(&prefix).context(StorageSnafu)?;
        let mut documents = BTreeSet::new();
        while let Some((key, _)) = iter.next_entry().context(StorageSnafu)? {
            let Some(row) = decode_target_document_key(&key) else {
                warn!(target_id = %target_id, "Malformed reference key ends document scan");
                break;
            };
            documents.insert(row.document_key);
        }
        Ok(documents)
    }

    /// Returns true if any target references the document. Sentinels are ignored.
    pub fn has_live_reference<V: ReadView>(view: &V, document_key: &DocumentKey) -> Result<bool> {
        let prefix = document_targets_prefix(document_key);
        let mut iter = view.prefix::<tables::DocumentTargets>(&prefix).context(StorageSnafu)?;
        while let Some((key, _)) = iter.next_entry().context(StorageSnafu)? {
            match decode_document_target_key(&key) {
                Some(row) if row.is_sentinel() => continue,
                Some(_) => return Ok(true),
                None => {
                    warn!(document = %document_key, "Malformed reference key ends reference check");
                    break;
                },
            }
        }
        Ok(false)
    }

    /// Reads a document's sentinel sequence number.
    pub fn sentinel<V: ReadView>(
        view: &V,
        document_key: &DocumentKey,
    ) -> Result<Option<ListenSequenceNumber>> {
        let value =
            view.get::<tables::DocumentTargets>(&sentinel_key(document_key)).context(StorageSnafu)?;
        match value {
            Some(value) => Ok(Some(decode_sentinel(document_key, &value)?)),
            None => Ok(None),
        }
    }

    /// Writes a document's sentinel, replacing any previous value.
    pub fn stamp_sentinel<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        document_key: &DocumentKey,
        sequence_number: ListenSequenceNumber,
    ) -> Result<()> {
        txn.insert::<tables::DocumentTargets>(
            &sentinel_key(document_key),
            &sequence_number.value().to_be_bytes().to_vec(),
        )
        .context(StorageSnafu)
    }

    /// Deletes a document's sentinel. Returns true if it existed.
    pub fn delete_sentinel<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        document_key: &DocumentKey,
    ) -> Result<bool> {
        txn.delete::<tables::DocumentTargets>(&sentinel_key(document_key)).context(StorageSnafu)
    }
}

/// Decodes a sentinel row value.
pub(crate) fn decode_sentinel(
    document_key: &DocumentKey,
    value: &[u8],
) -> Result<ListenSequenceNumber> {
    let bytes: [u8; 8] = value.try_into().map_err(|_| {
        CorruptSentinelSnafu { document_key: document_key.path(), len: value.len() }.build()
    })?;
    Ok(ListenSequenceNumber::new(i64::from_be_bytes(bytes)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use synccache_store::Database;

    use super::*;
    use crate::TargetCacheError;

    fn doc(path: &str) -> DocumentKey {
        DocumentKey::from_path(path).expect("valid path")
    }

    #[test]
    fn test_add_writes_both_directions() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        DocumentReferences::add(&mut txn, TargetId::new(2), &doc("c/a")).expect("add");

        let forward = target_document_key(TargetId::new(2), &doc("c/a"));
        let reverse = document_target_key(&doc("c/a"), TargetId::new(2));
        assert!(txn.contains::<tables::TargetDocuments>(&forward).expect("contains"));
        assert!(txn.contains::<tables::DocumentTargets>(&reverse).expect("contains"));
    }

    #[test]
    fn test_remove_deletes_both_directions() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        DocumentReferences::add(&mut txn, TargetId::new(2), &doc("c/a")).expect("add");

        let removed = DocumentReferences::remove(&mut txn, TargetId::new(2), &doc("c/a"));
        assert!(removed.expect("remove"));
        let again = DocumentReferences::remove(&mut txn, TargetId::new(2), &doc("c/a"));
        assert!(!again.expect("remove"));
        assert_eq!(txn.entry_count::<tables::TargetDocuments>(), 0);
        assert_eq!(txn.entry_count::<tables::DocumentTargets>(), 0);
    }

    #[test]
    fn test_documents_for_target_is_scoped_to_target() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        DocumentReferences::add(&mut txn, TargetId::new(2), &doc("c/b")).expect("add");
        DocumentReferences::add(&mut txn, TargetId::new(2), &doc("c/a")).expect("add");
        DocumentReferences::add(&mut txn, TargetId::new(4), &doc("c/z")).expect("add");

        let docs = DocumentReferences::documents_for_target(&txn, TargetId::new(2)).expect("scan");
        assert_eq!(docs.into_iter().collect::<Vec<_>>(), vec![doc("c/a"), doc("c/b")]);
    }

    #[test]
    fn test_live_reference_ignores_sentinel() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        let key = doc("c/a");

        DocumentReferences::stamp_sentinel(&mut txn, &key, ListenSequenceNumber::new(3))
            .expect("stamp");
        assert!(!DocumentReferences::has_live_reference(&txn, &key).expect("check"));

        DocumentReferences::add(&mut txn, TargetId::new(2), &key).expect("add");
        assert!(DocumentReferences::has_live_reference(&txn, &key).expect("check"));

        // A child document's references do not count for the parent.
        DocumentReferences::add(&mut txn, TargetId::new(2), &doc("c/b/d/e")).expect("add");
        assert!(!DocumentReferences::has_live_reference(&txn, &doc("c/b")).expect("check"));
    }

    #[test]
    fn test_sentinel_stamp_read_delete() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        let key = doc("c/a");

        assert_eq!(DocumentReferences::sentinel(&txn, &key).expect("read"), None);
        DocumentReferences::stamp_sentinel(&mut txn, &key, ListenSequenceNumber::new(5))
            .expect("stamp");
        DocumentReferences::stamp_sentinel(&mut txn, &key, ListenSequenceNumber::new(9))
            .expect("restamp");
        assert_eq!(
            DocumentReferences::sentinel(&txn, &key).expect("read"),
            Some(ListenSequenceNumber::new(9))
        );

        assert!(DocumentReferences::delete_sentinel(&mut txn, &key).expect("delete"));
        assert_eq!(DocumentReferences::sentinel(&txn, &key).expect("read"), None);
    }

    #[test]
    fn test_short_sentinel_value_is_corrupt() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        let key = doc("c/a");
        txn.insert::<tables::DocumentTargets>(&sentinel_key(&key), &vec![1, 2, 3]).expect("insert");

        let err = DocumentReferences::sentinel(&txn, &key).expect_err("corrupt");
        assert!(matches!(err, TargetCacheError::CorruptSentinel { len: 3, .. }));
    }
}
