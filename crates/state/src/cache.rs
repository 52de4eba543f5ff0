//! The target cache: target lifecycle, membership mutations, orphan
//! detection and sequence-bounded eviction over one store.
//!
//! Every operation runs inside a transaction obtained from the cache:
//! - [`TargetCache::read`] returns a [`TargetCacheReader`] over a snapshot
//! - [`TargetCache::write`] returns a [`TargetCacheWriter`] holding the
//!   store's single write lock
//!
//! Both implement [`TargetRead`]; only the writer mutates. The metadata
//! record is staged in the writer and published to the cache's in-memory
//! copy only after the store commit succeeds, so an aborted or dropped
//! writer leaves both the store and the in-memory copy untouched.

use std::{collections::BTreeSet, ops::ControlFlow, sync::Arc};

use parking_lot::RwLock;
use snafu::{ResultExt, ensure};
use synccache_store::{Database, ReadTransaction, ReadView, StorageBackend, WriteTransaction};
use synccache_types::{
    DocumentKey, ListenSequenceNumber, Query, SnapshotVersion, TargetData, TargetId,
    TargetMetadata,
};
use tracing::{debug, info};

use crate::{
    error::{
        DanglingQueryIndexSnafu, InvalidTargetIdSnafu, MissingMetadataSnafu, Result, StorageSnafu,
    },
    ids::{ListenSequence, TargetIdGenerator},
    metadata::MetadataStore,
    orphans,
    query_index::QueryIndex,
    references::DocumentReferences,
    targets::TargetStore,
};

/// A membership change for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetMapping {
    /// Replace the target's entire document set.
    Reset {
        /// The complete new document set.
        documents: BTreeSet<DocumentKey>,
    },
    /// Apply an incremental change.
    Update {
        /// Documents that now match the target.
        added: BTreeSet<DocumentKey>,
        /// Documents that no longer match the target.
        removed: BTreeSet<DocumentKey>,
    },
}

/// Outcome of resolving a single orphan candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanResolution {
    /// The document has no sentinel.
    Nonexistent,
    /// The sentinel was at or below the bound and has been deleted.
    Removed,
    /// The document is referenced again, or was touched after the bound.
    Retained,
}

/// Outcome of [`TargetCacheWriter::remove_targets_through`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedTargets {
    /// Number of targets removed.
    pub count: usize,
    /// Documents that lost their last reference to a removed target.
    pub orphan_candidates: BTreeSet<DocumentKey>,
}

// ============================================================================
// Cache handle
// ============================================================================

/// Durable target/document reference cache.
///
/// Generic over [`StorageBackend`] to support both file-based (production)
/// and in-memory (testing) storage.
pub struct TargetCache<B: StorageBackend> {
    /// Shared database handle.
    db: Arc<Database<B>>,
    /// Last committed metadata record.
    metadata: RwLock<TargetMetadata>,
}

impl<B: StorageBackend> TargetCache<B> {
    /// Opens the cache over a database, writing an initial metadata record
    /// if the store has never held one.
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::Storage`](crate::TargetCacheError::Storage)
    /// or [`TargetCacheError::Codec`](crate::TargetCacheError::Codec) if the
    /// metadata record cannot be read or written.
    pub fn open(db: Arc<Database<B>>) -> Result<Self> {
        let existing = {
            let txn = db.read().context(StorageSnafu)?;
            MetadataStore::get(&txn)?
        };

        let metadata = match existing {
            Some(metadata) => metadata,
            None => {
                let metadata = TargetMetadata::default();
                let mut txn = db.write().context(StorageSnafu)?;
                MetadataStore::put(&mut txn, &metadata)?;
                txn.commit().context(StorageSnafu)?;
                info!("Initialized target metadata");
                metadata
            },
        };

        debug!(
            highest_target_id = %metadata.highest_target_id,
            highest_sequence_number = %metadata.highest_listen_sequence_number,
            target_count = metadata.target_count,
            "Opened target cache"
        );

        Ok(Self { db, metadata: RwLock::new(metadata) })
    }

    /// Returns the underlying database handle.
    pub fn database(&self) -> &Arc<Database<B>> {
        &self.db
    }

    /// Returns the last committed metadata record.
    pub fn metadata(&self) -> TargetMetadata {
        *self.metadata.read()
    }

    /// Highest target id ever added.
    pub fn highest_target_id(&self) -> TargetId {
        self.metadata.read().highest_target_id
    }

    /// Highest sequence number ever stamped on a target or sentinel.
    pub fn highest_listen_sequence_number(&self) -> ListenSequenceNumber {
        self.metadata.read().highest_listen_sequence_number
    }

    /// Snapshot version of the last applied remote event.
    pub fn last_remote_snapshot_version(&self) -> SnapshotVersion {
        self.metadata.read().last_remote_snapshot_version
    }

    /// Number of targets currently stored.
    pub fn target_count(&self) -> u64 {
        self.metadata.read().target_count
    }

    /// Returns a generator of fresh target ids above every id ever stored.
    pub fn target_id_generator(&self) -> TargetIdGenerator {
        TargetIdGenerator::for_target_cache(self.highest_target_id())
    }

    /// Returns a sequence number source continuing after the highest stamped one.
    pub fn listen_sequence(&self) -> ListenSequence {
        ListenSequence::new(self.highest_listen_sequence_number())
    }

    /// Begins a read transaction over the latest committed state.
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::Storage`](crate::TargetCacheError::Storage)
    /// if the snapshot cannot be taken.
    pub fn read(&self) -> Result<TargetCacheReader> {
        Ok(TargetCacheReader { txn: self.db.read().context(StorageSnafu)? })
    }

    /// Begins a write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::Storage`](crate::TargetCacheError::Storage)
    /// if the store's write lock is poisoned.
    pub fn write(&self) -> Result<TargetCacheWriter<'_, B>> {
        let txn = self.db.write().context(StorageSnafu)?;
        // The staged copy starts from the committed record, which exists
        // from `open` onwards.
        ensure!(MetadataStore::get(&txn)?.is_some(), MissingMetadataSnafu);
        Ok(TargetCacheWriter {
            cache: self,
            txn,
            metadata: self.metadata(),
            metadata_changed: false,
        })
    }
}

// ============================================================================
// Read operations
// ============================================================================

/// Read operations shared by [`TargetCacheReader`] and [`TargetCacheWriter`].
pub trait TargetRead {
    /// Store view the operations read through.
    type View: ReadView;

    /// Returns the underlying store view.
    fn view(&self) -> &Self::View;

    /// Loads a target by id.
    fn get_target(&self, target_id: TargetId) -> Result<Option<TargetData>> {
        TargetStore::get(self.view(), target_id)
    }

    /// Finds the target whose query is structurally equal to `query`.
    ///
    /// Candidates come from the canonical-id index and are confirmed against
    /// the stored target. An index entry without a target row is a
    /// [`TargetCacheError::DanglingQueryIndex`](crate::TargetCacheError::DanglingQueryIndex).
    fn find_target(&self, query: &Query) -> Result<Option<TargetData>> {
        let canonical_id = query.canonical_id();
        for target_id in QueryIndex::candidates(self.view(), &canonical_id)? {
            let target = TargetStore::get(self.view(), target_id)?.ok_or_else(|| {
                DanglingQueryIndexSnafu { canonical_id: &canonical_id, target_id }.build()
            })?;
            if target.target == *query {
                return Ok(Some(target));
            }
        }
        Ok(None)
    }

    /// Visits every stored target in id order until the visitor breaks.
    fn for_each_target<F>(&self, visitor: F) -> Result<()>
    where
        F: FnMut(TargetData) -> ControlFlow<()>,
    {
        TargetStore::for_each(self.view(), visitor)
    }

    /// Number of target rows in the store.
    fn count_targets(&self) -> usize {
        TargetStore::count(self.view())
    }

    /// Returns every document currently referenced by a target.
    fn matching_keys_for_target(&self, target_id: TargetId) -> Result<BTreeSet<DocumentKey>> {
        DocumentReferences::documents_for_target(self.view(), target_id)
    }

    /// Returns true if any target references the document.
    fn contains_key(&self, document_key: &DocumentKey) -> Result<bool> {
        DocumentReferences::has_live_reference(self.view(), document_key)
    }

    /// Returns the document's sentinel sequence number, if it has one.
    fn sentinel_sequence_number(
        &self,
        document_key: &DocumentKey,
    ) -> Result<Option<ListenSequenceNumber>> {
        DocumentReferences::sentinel(self.view(), document_key)
    }

    /// Reports every document with a sentinel and no references, in key order.
    ///
    /// See [`orphans::enumerate_orphaned_documents`].
    fn enumerate_orphaned_documents<F>(&self, visitor: F) -> Result<()>
    where
        F: FnMut(&DocumentKey, ListenSequenceNumber) -> ControlFlow<()>,
    {
        orphans::enumerate_orphaned_documents(self.view(), visitor)
    }
}

/// Read-only view of the cache at one committed snapshot.
pub struct TargetCacheReader {
    txn: ReadTransaction,
}

impl TargetRead for TargetCacheReader {
    type View = ReadTransaction;

    fn view(&self) -> &ReadTransaction {
        &self.txn
    }
}

// ============================================================================
// Write operations
// ============================================================================

/// Read-write transaction over the cache.
///
/// Call [`commit`](Self::commit) to make the changes durable and visible.
/// Dropping the writer discards them.
pub struct TargetCacheWriter<'c, B: StorageBackend> {
    cache: &'c TargetCache<B>,
    txn: WriteTransaction<'c, B>,
    /// Staged metadata, published to `cache` after commit.
    metadata: TargetMetadata,
    metadata_changed: bool,
}

impl<'c, B: StorageBackend> TargetRead for TargetCacheWriter<'c, B> {
    type View = WriteTransaction<'c, B>;

    fn view(&self) -> &WriteTransaction<'c, B> {
        &self.txn
    }
}

impl<B: StorageBackend> TargetCacheWriter<'_, B> {
    /// Returns the metadata as staged in this transaction.
    pub fn metadata(&self) -> TargetMetadata {
        self.metadata
    }

    /// Stores a new target and registers its query.
    ///
    /// Adding an id that is already stored overwrites it without changing
    /// the target count; a changed query moves its registration.
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::InvalidTargetId`](crate::TargetCacheError::InvalidTargetId)
    /// for a non-positive id.
    pub fn add_target(&mut self, target: &TargetData) -> Result<()> {
        check_target_id(target.target_id)?;

        let existed = self.store_target(target)?;
        if !existed {
            self.metadata.target_count += 1;
        }
        self.raise_maxima(target);
        self.save_metadata()?;

        debug!(
            target_id = %target.target_id,
            sequence_number = %target.sequence_number,
            "Added target"
        );
        Ok(())
    }

    /// Overwrites a stored target.
    ///
    /// The metadata record is rewritten only if a maximum changed. Updating
    /// an id that is not stored behaves like [`add_target`](Self::add_target).
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::InvalidTargetId`](crate::TargetCacheError::InvalidTargetId)
    /// for a non-positive id.
    pub fn update_target(&mut self, target: &TargetData) -> Result<()> {
        check_target_id(target.target_id)?;

        let existed = self.store_target(target)?;
        let mut changed = self.raise_maxima(target);
        if !existed {
            self.metadata.target_count += 1;
            changed = true;
        }
        if changed {
            self.save_metadata()?;
        }

        debug!(target_id = %target.target_id, metadata_changed = changed, "Updated target");
        Ok(())
    }

    /// Removes a target, its query registration and all its references.
    ///
    /// Sentinels are left untouched. Returns the documents that lost their
    /// last reference.
    pub fn remove_target(&mut self, target: &TargetData) -> Result<BTreeSet<DocumentKey>> {
        let candidates = self.remove_matching_keys_for_target(target.target_id)?;

        let canonical_id = match TargetStore::get(&self.txn, target.target_id)? {
            Some(stored) => stored.canonical_id(),
            None => target.canonical_id(),
        };
        QueryIndex::delete(&mut self.txn, &canonical_id, target.target_id)?;

        if TargetStore::delete(&mut self.txn, target.target_id)? {
            self.metadata.target_count = self.metadata.target_count.saturating_sub(1);
            self.save_metadata()?;
        }

        debug!(
            target_id = %target.target_id,
            orphan_candidates = candidates.len(),
            "Removed target"
        );
        Ok(candidates)
    }

    /// Applies a membership change stamped with `sequence_number`.
    ///
    /// Every document whose reference set changed gets its sentinel stamped
    /// with `sequence_number`. Returns the documents that lost their last
    /// reference in this change.
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::InvalidTargetId`](crate::TargetCacheError::InvalidTargetId)
    /// for a non-positive id.
    pub fn apply_mapping(
        &mut self,
        target_id: TargetId,
        mapping: &TargetMapping,
        sequence_number: ListenSequenceNumber,
    ) -> Result<BTreeSet<DocumentKey>> {
        check_target_id(target_id)?;

        let mut candidates = BTreeSet::new();
        match mapping {
            TargetMapping::Reset { documents } => {
                let existing = DocumentReferences::documents_for_target(&self.txn, target_id)?;
                for document_key in existing.difference(documents) {
                    self.unlink(target_id, document_key, sequence_number, &mut candidates)?;
                }
                for document_key in documents {
                    self.link(target_id, document_key, sequence_number, &mut candidates)?;
                }
            },
            TargetMapping::Update { added, removed } => {
                for document_key in removed {
                    self.unlink(target_id, document_key, sequence_number, &mut candidates)?;
                }
                for document_key in added {
                    self.link(target_id, document_key, sequence_number, &mut candidates)?;
                }
            },
        }

        if self.raise_sequence_number(sequence_number) {
            self.save_metadata()?;
        }

        debug!(
            target_id = %target_id,
            sequence_number = %sequence_number,
            orphan_candidates = candidates.len(),
            "Applied target mapping"
        );
        Ok(candidates)
    }

    /// Adds references from a target to each document.
    ///
    /// # Errors
    ///
    /// Same conditions as [`apply_mapping`](Self::apply_mapping).
    pub fn add_matching_keys<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k DocumentKey>,
        target_id: TargetId,
        sequence_number: ListenSequenceNumber,
    ) -> Result<()> {
        check_target_id(target_id)?;
        let mut candidates = BTreeSet::new();
        for document_key in keys {
            self.link(target_id, document_key, sequence_number, &mut candidates)?;
        }
        if self.raise_sequence_number(sequence_number) {
            self.save_metadata()?;
        }
        Ok(())
    }

    /// Removes references from a target to each document.
    ///
    /// Returns the documents that lost their last reference.
    ///
    /// # Errors
    ///
    /// Same conditions as [`apply_mapping`](Self::apply_mapping).
    pub fn remove_matching_keys<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k DocumentKey>,
        target_id: TargetId,
        sequence_number: ListenSequenceNumber,
    ) -> Result<BTreeSet<DocumentKey>> {
        check_target_id(target_id)?;
        let mut candidates = BTreeSet::new();
        for document_key in keys {
            self.unlink(target_id, document_key, sequence_number, &mut candidates)?;
        }
        if self.raise_sequence_number(sequence_number) {
            self.save_metadata()?;
        }
        Ok(candidates)
    }

    /// Removes every reference held by a target without touching sentinels.
    ///
    /// Returns the documents that lost their last reference.
    pub fn remove_matching_keys_for_target(
        &mut self,
        target_id: TargetId,
    ) -> Result<BTreeSet<DocumentKey>> {
        let documents = DocumentReferences::documents_for_target(&self.txn, target_id)?;
        let mut candidates = BTreeSet::new();
        for document_key in documents {
            DocumentReferences::remove(&mut self.txn, target_id, &document_key)?;
            if !DocumentReferences::has_live_reference(&self.txn, &document_key)? {
                candidates.insert(document_key);
            }
        }
        Ok(candidates)
    }

    /// Removes every target with `sequence_number <= upper_bound` that is not
    /// in `live_target_ids`.
    ///
    /// Sentinels are left untouched, as in [`remove_target`](Self::remove_target).
    pub fn remove_targets_through(
        &mut self,
        upper_bound: ListenSequenceNumber,
        live_target_ids: &BTreeSet<TargetId>,
    ) -> Result<RemovedTargets> {
        let mut doomed = Vec::new();
        TargetStore::for_each(&self.txn, |target| {
            if target.sequence_number <= upper_bound && !live_target_ids.contains(&target.target_id)
            {
                doomed.push(target);
            }
            ControlFlow::Continue(())
        })?;

        let mut orphan_candidates = BTreeSet::new();
        for target in &doomed {
            orphan_candidates.append(&mut self.remove_target(target)?);
        }

        debug!(
            upper_bound = %upper_bound,
            removed = doomed.len(),
            orphan_candidates = orphan_candidates.len(),
            "Removed targets through bound"
        );
        Ok(RemovedTargets { count: doomed.len(), orphan_candidates })
    }

    /// Decides the fate of one orphan candidate.
    ///
    /// - no sentinel: [`OrphanResolution::Nonexistent`]
    /// - still referenced, or sentinel above `upper_bound`: [`OrphanResolution::Retained`]
    /// - otherwise the sentinel is deleted: [`OrphanResolution::Removed`]
    pub fn resolve_orphan(
        &mut self,
        document_key: &DocumentKey,
        upper_bound: ListenSequenceNumber,
    ) -> Result<OrphanResolution> {
        let resolution = match DocumentReferences::sentinel(&self.txn, document_key)? {
            None => OrphanResolution::Nonexistent,
            Some(_) if DocumentReferences::has_live_reference(&self.txn, document_key)? => {
                OrphanResolution::Retained
            },
            Some(sequence_number) if sequence_number <= upper_bound => {
                DocumentReferences::delete_sentinel(&mut self.txn, document_key)?;
                OrphanResolution::Removed
            },
            Some(_) => OrphanResolution::Retained,
        };

        debug!(document = %document_key, ?resolution, "Resolved orphan candidate");
        Ok(resolution)
    }

    /// Records the snapshot version of the latest remote event.
    pub fn set_last_remote_snapshot_version(&mut self, version: SnapshotVersion) -> Result<()> {
        self.metadata.last_remote_snapshot_version = version;
        self.save_metadata()
    }

    /// Commits all changes and publishes the staged metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TargetCacheError::Storage`](crate::TargetCacheError::Storage)
    /// if the store commit fails; the in-memory metadata is then unchanged.
    pub fn commit(self) -> Result<()> {
        let Self { cache, txn, metadata, metadata_changed } = self;
        txn.commit().context(StorageSnafu)?;
        if metadata_changed {
            *cache.metadata.write() = metadata;
        }
        Ok(())
    }

    /// Discards all changes.
    pub fn abort(self) {
        self.txn.abort();
    }

    /// Writes the target row and keeps its query registration in step with
    /// it. Returns true if a row for this id already existed.
    fn store_target(&mut self, target: &TargetData) -> Result<bool> {
        let canonical_id = target.canonical_id();
        let previous = TargetStore::put(&mut self.txn, target)?;
        let registered = match &previous {
            Some(stored) => {
                let stored_id = stored.canonical_id();
                if stored_id != canonical_id {
                    QueryIndex::delete(&mut self.txn, &stored_id, target.target_id)?;
                }
                stored_id == canonical_id
            },
            None => false,
        };
        if !registered {
            QueryIndex::insert(&mut self.txn, &canonical_id, target.target_id)?;
        }
        Ok(previous.is_some())
    }

    fn link(
        &mut self,
        target_id: TargetId,
        document_key: &DocumentKey,
        sequence_number: ListenSequenceNumber,
        candidates: &mut BTreeSet<DocumentKey>,
    ) -> Result<()> {
        DocumentReferences::add(&mut self.txn, target_id, document_key)?;
        DocumentReferences::stamp_sentinel(&mut self.txn, document_key, sequence_number)?;
        candidates.remove(document_key);
        Ok(())
    }

    fn unlink(
        &mut self,
        target_id: TargetId,
        document_key: &DocumentKey,
        sequence_number: ListenSequenceNumber,
        candidates: &mut BTreeSet<DocumentKey>,
    ) -> Result<()> {
        DocumentReferences::remove(&mut self.txn, target_id, document_key)?;
        DocumentReferences::stamp_sentinel(&mut self.txn, document_key, sequence_number)?;
        if !DocumentReferences::has_live_reference(&self.txn, document_key)? {
            candidates.insert(document_key.clone());
        }
        Ok(())
    }

    fn raise_maxima(&mut self, target: &TargetData) -> bool {
        let mut changed = false;
        if target.target_id > self.metadata.highest_target_id {
            self.metadata.highest_target_id = target.target_id;
            changed = true;
        }
        self.raise_sequence_number(target.sequence_number) || changed
    }

    fn raise_sequence_number(&mut self, sequence_number: ListenSequenceNumber) -> bool {
        if sequence_number > self.metadata.highest_listen_sequence_number {
            self.metadata.highest_listen_sequence_number = sequence_number;
            true
        } else {
            false
        }
    }

    fn save_metadata(&mut self) -> Result<()> {
        MetadataStore::put(&mut self.txn, &self.metadata)?;
        self.metadata_changed = true;
        Ok(())
    }
}

fn check_target_id(target_id: TargetId) -> Result<()> {
    ensure!(target_id.is_valid(), InvalidTargetIdSnafu { target_id });
    Ok(())
}
