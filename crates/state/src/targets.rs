//! Target table storage operations.
//!
//! One row per target: `{target_id}` -> postcard [`TargetData`].

use std::ops::ControlFlow;

use snafu::ResultExt;
use synccache_store::{ReadView, StorageBackend, WriteTransaction, tables};
use synccache_types::{TargetData, TargetId, decode, encode};
use tracing::warn;

use crate::{
    error::{CodecSnafu, Result, StorageSnafu},
    keys::{decode_target_key, target_key},
};

/// Target row storage operations.
pub struct TargetStore;

impl TargetStore {
    /// Loads a target by id.
    pub fn get<V: ReadView>(view: &V, target_id: TargetId) -> Result<Option<TargetData>> {
        match view.get::<tables::Targets>(&target_key(target_id)).context(StorageSnafu)? {
            Some(data) => Ok(Some(decode(&data).context(CodecSnafu)?)),
            None => Ok(None),
        }
    }

    /// Writes a target row. Returns the row it replaced, if any.
    pub fn put<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        target: &TargetData,
    ) -> Result<Option<TargetData>> {
        let previous = Self::get(txn, target.target_id)?;
        let encoded = encode(target).context(CodecSnafu)?;
        txn.insert::<tables::Targets>(&target_key(target.target_id), &encoded)
            .context(StorageSnafu)?;
        Ok(previous)
    }

    /// Deletes a target row. Returns true if it existed.
    pub fn delete<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        target_id: TargetId,
    ) -> Result<bool> {
        txn.delete::<tables::Targets>(&target_key(target_id)).context(StorageSnafu)
    }

    /// Visits every target in id order until the visitor breaks.
    ///
    /// A row whose key does not decode ends the scan.
    pub fn for_each<V, F>(view: &V, mut visitor: F) -> Result<()>
    where
        V: ReadView,
        F: FnMut(TargetData) -> ControlFlow<()>,
    {
        let mut iter = view.iter::<tables::Targets>().context(StorageSnafu)?;
        while let Some((key, value)) = iter.next_entry().context(StorageSnafu)? {
            if decode_target_key(&key).is_none() {
                warn!(key_len = key.len(), "Malformed target key ends target scan");
                break;
            }
            let target: TargetData = decode(&value).context(CodecSnafu)?;
            if visitor(target).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Counts target rows.
    pub fn count<V: ReadView>(view: &V) -> usize {
        view.entry_count::<tables::Targets>()
    }
}
