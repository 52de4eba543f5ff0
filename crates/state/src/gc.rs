//! LRU-style collection pass over targets and orphaned documents.
//!
//! A pass picks the n-th smallest sequence number among all targets and
//! orphaned documents as its threshold, then in a single write transaction
//! removes every non-live target and every orphaned document stamped at or
//! below it.

use std::{
    collections::{BTreeSet, BinaryHeap},
    ops::ControlFlow,
};

use synccache_store::StorageBackend;
use synccache_types::{
    DocumentKey, ListenSequenceNumber, TargetId,
    config::{CacheConfig, GcConfig},
};
use tracing::{debug, info};

use crate::{
    cache::{OrphanResolution, TargetCache, TargetRead},
    error::Result,
};

/// Outcome of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcResults {
    /// False if there was nothing to collect and no transaction was committed.
    pub did_run: bool,
    /// How many sequence numbers the threshold was chosen to cover.
    pub sequence_numbers_collected: usize,
    /// Targets removed.
    pub targets_removed: usize,
    /// Orphaned documents whose sentinels were removed.
    pub documents_removed: usize,
}

/// Percentile-driven collector.
#[derive(Debug, Clone)]
pub struct LruGarbageCollector {
    config: GcConfig,
}

impl LruGarbageCollector {
    /// Creates a collector with the given policy.
    pub fn new(config: GcConfig) -> Self {
        Self { config }
    }

    /// Creates a collector with the policy carried by a cache config.
    pub fn from_cache_config(config: &CacheConfig) -> Self {
        Self::new(config.gc.clone())
    }

    /// Returns the collection policy.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Number of sequence numbers in play: one per target, one per orphan.
    pub fn sequence_number_count<R: TargetRead>(reader: &R) -> Result<usize> {
        let mut orphans = 0usize;
        reader.enumerate_orphaned_documents(|_, _| {
            orphans += 1;
            ControlFlow::Continue(())
        })?;
        Ok(reader.count_targets() + orphans)
    }

    /// Returns the n-th smallest sequence number across targets and orphans.
    ///
    /// Returns [`ListenSequenceNumber::INVALID`] when `n` is zero.
    pub fn nth_sequence_number<R: TargetRead>(
        reader: &R,
        n: usize,
    ) -> Result<ListenSequenceNumber> {
        if n == 0 {
            return Ok(ListenSequenceNumber::INVALID);
        }

        // Max-heap holding the n smallest values seen so far.
        let mut smallest = BinaryHeap::with_capacity(n);
        let mut offer = |sequence_number: ListenSequenceNumber| {
            if smallest.len() < n {
                smallest.push(sequence_number);
            } else if smallest.peek().is_some_and(|&max| sequence_number < max) {
                smallest.pop();
                smallest.push(sequence_number);
            }
        };

        reader.for_each_target(|target| {
            offer(target.sequence_number);
            ControlFlow::Continue(())
        })?;
        reader.enumerate_orphaned_documents(|_, sequence_number| {
            offer(sequence_number);
            ControlFlow::Continue(())
        })?;

        Ok(smallest.peek().copied().unwrap_or(ListenSequenceNumber::INVALID))
    }

    /// How many sequence numbers a pass over `count` of them should cover.
    pub fn sequence_numbers_to_collect(&self, count: usize) -> usize {
        let percentile = usize::from(self.config.percentile_to_collect);
        let maximum = self.config.maximum_sequence_numbers_to_collect;
        (count.saturating_mul(percentile) / 100).min(maximum)
    }

    /// Runs one collection pass.
    ///
    /// Targets in `live_target_ids` are never removed, whatever their
    /// sequence number.
    ///
    /// # Errors
    ///
    /// Propagates any [`TargetCacheError`](crate::TargetCacheError) raised
    /// while scanning or mutating; nothing is committed in that case.
    pub fn collect<B: StorageBackend>(
        &self,
        cache: &TargetCache<B>,
        live_target_ids: &BTreeSet<TargetId>,
    ) -> Result<GcResults> {
        let mut writer = cache.write()?;

        let count = Self::sequence_number_count(&writer)?;
        let to_collect = self.sequence_numbers_to_collect(count);
        if to_collect == 0 {
            writer.abort();
            debug!(count, "Nothing to collect");
            return Ok(GcResults::default());
        }

        let upper_bound = Self::nth_sequence_number(&writer, to_collect)?;
        let targets_removed = writer.remove_targets_through(upper_bound, live_target_ids)?.count;

        let mut candidates: Vec<DocumentKey> = Vec::new();
        writer.enumerate_orphaned_documents(|document_key, sequence_number| {
            if sequence_number <= upper_bound {
                candidates.push(document_key.clone());
            }
            ControlFlow::Continue(())
        })?;

        let mut documents_removed = 0;
        for document_key in &candidates {
            if writer.resolve_orphan(document_key, upper_bound)? == OrphanResolution::Removed {
                documents_removed += 1;
            }
        }

        writer.commit()?;

        info!(
            upper_bound = %upper_bound,
            sequence_numbers_collected = to_collect,
            targets_removed,
            documents_removed,
            "Collection pass complete"
        );

        Ok(GcResults {
            did_run: true,
            sequence_numbers_collected: to_collect,
            targets_removed,
            documents_removed,
        })
    }
}
