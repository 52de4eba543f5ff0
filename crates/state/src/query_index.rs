//! Canonical query id to target id index.
//!
//! Canonical ids are not unique across structurally different queries, so
//! the index yields candidates that the caller must confirm against the
//! target row.

use snafu::ResultExt;
use synccache_store::{ReadView, StorageBackend, WriteTransaction, tables};
use synccache_types::TargetId;
use tracing::warn;

use crate::{
    error::{Result, StorageSnafu},
    keys::{decode_query_target_key, query_target_key, query_target_prefix},
};

/// Query index storage operations.
pub struct QueryIndex;

impl QueryIndex {
    /// Registers a target under its canonical id.
    pub fn insert<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        canonical_id: &str,
        target_id: TargetId,
    ) -> Result<()> {
        txn.insert::<tables::TargetQueries>(&query_target_key(canonical_id, target_id), &Vec::new())
            .context(StorageSnafu)
    }

    /// Removes a target's registration. Returns true if it existed.
    pub fn delete<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        canonical_id: &str,
        target_id: TargetId,
    ) -> Result<bool> {
        txn.delete::<tables::TargetQueries>(&query_target_key(canonical_id, target_id))
            .context(StorageSnafu)
    }

    /// Returns every target id registered under `canonical_id`, in id order.
    pub fn candidates<V: ReadView>(view: &V, canonical_id: &str) -> Result<Vec<TargetId>> {
        let prefix = query_target_prefix(canonical_id);
        let mut iter = view.prefix::<tables::TargetQueries>(&prefix).context(StorageSnafu)?;
        let mut ids = Vec::new();
        while let Some((key, _)) = iter.next_entry().context(StorageSnafu)? {
            let Some(row) = decode_query_target_key(&key) else {
                warn!(canonical_id, "Malformed query index key ends candidate scan");
                break;
            };
            ids.push(row.target_id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use synccache_store::Database;

    use super::*;

    #[test]
    fn test_candidates_share_canonical_id() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        QueryIndex::insert(&mut txn, "rooms", TargetId::new(4)).expect("insert");
        QueryIndex::insert(&mut txn, "rooms", TargetId::new(2)).expect("insert");
        QueryIndex::insert(&mut txn, "rooms|l:1", TargetId::new(6)).expect("insert");
        QueryIndex::insert(&mut txn, "room", TargetId::new(8)).expect("insert");

        assert_eq!(
            QueryIndex::candidates(&txn, "rooms").expect("scan"),
            vec![TargetId::new(2), TargetId::new(4)]
        );
        assert_eq!(QueryIndex::candidates(&txn, "room").expect("scan"), vec![TargetId::new(8)]);
        assert!(QueryIndex::candidates(&txn, "missing").expect("scan").is_empty());
    }

    #[test]
    fn test_delete_removes_single_registration() {
        let db = Database::open_in_memory().expect("open");
        let mut txn = db.write().expect("write");
        QueryIndex::insert(&mut txn, "rooms", TargetId::new(2)).expect("insert");
        QueryIndex::insert(&mut txn, "rooms", TargetId::new(4)).expect("insert");

        assert!(QueryIndex::delete(&mut txn, "rooms", TargetId::new(2)).expect("delete"));
        assert!(!QueryIndex::delete(&mut txn, "rooms", TargetId::new(2)).expect("delete"));
        assert_eq!(QueryIndex::candidates(&txn, "rooms").expect("scan"), vec![TargetId::new(4)]);
    }
}
