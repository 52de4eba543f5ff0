//! Persistence of the singleton target metadata record.

use snafu::ResultExt;
use synccache_store::{ReadView, StorageBackend, WriteTransaction, tables};
use synccache_types::{TargetMetadata, decode, encode};

use crate::error::{CodecSnafu, Result, StorageSnafu};

/// Key of the metadata record in the global table.
pub const TARGET_GLOBAL_KEY: &str = "target_global";

/// Metadata record storage operations.
pub struct MetadataStore;

impl MetadataStore {
    /// Reads the metadata record, or `None` if it was never written.
    pub fn get<V: ReadView>(view: &V) -> Result<Option<TargetMetadata>> {
        let data =
            view.get::<tables::TargetGlobal>(&TARGET_GLOBAL_KEY.to_string()).context(StorageSnafu)?;
        match data {
            Some(data) => Ok(Some(decode(&data).context(CodecSnafu)?)),
            None => Ok(None),
        }
    }

    /// Writes the metadata record.
    pub fn put<B: StorageBackend>(
        txn: &mut WriteTransaction<'_, B>,
        metadata: &TargetMetadata,
    ) -> Result<()> {
        let encoded = encode(metadata).context(CodecSnafu)?;
        txn.insert::<tables::TargetGlobal>(&TARGET_GLOBAL_KEY.to_string(), &encoded)
            .context(StorageSnafu)
    }
}
