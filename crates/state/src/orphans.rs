//! Orphan detection by a single pass over the document-to-target index.
//!
//! Within each document's key range the sentinel row (target id 0) sorts
//! before any reference row. The scan keeps one pending candidate: a
//! sentinel makes its document pending, any reference row for that document
//! clears it, and reaching another document (or the end of the table)
//! reports it.

use std::ops::ControlFlow;

use snafu::ResultExt;
use synccache_store::{ReadView, tables};
use synccache_types::{DocumentKey, ListenSequenceNumber};
use tracing::warn;

use crate::{
    error::{Result, StorageSnafu},
    keys::decode_document_target_key,
    references::decode_sentinel,
};

/// Reports every document that has a sentinel and no reference rows.
///
/// The visitor receives the document key and its sentinel sequence number.
/// Returning [`ControlFlow::Break`] stops the scan immediately; a candidate
/// that was still pending at that point is not reported. A row whose key does
/// not decode also ends the scan without reporting the pending candidate,
/// since its reference state is unknown.
pub fn enumerate_orphaned_documents<V, F>(view: &V, mut visitor: F) -> Result<()>
where
    V: ReadView,
    F: FnMut(&DocumentKey, ListenSequenceNumber) -> ControlFlow<()>,
{
    let mut pending: Option<(DocumentKey, ListenSequenceNumber)> = None;
    let mut iter = view.iter::<tables::DocumentTargets>().context(StorageSnafu)?;

    while let Some((key, value)) = iter.next_entry().context(StorageSnafu)? {
        let Some(row) = decode_document_target_key(&key) else {
            warn!(key_len = key.len(), "Malformed document index key ends orphan scan");
            return Ok(());
        };

        if row.is_sentinel() {
            if let Some((candidate, sequence_number)) = pending.take() {
                if visitor(&candidate, sequence_number).is_break() {
                    return Ok(());
                }
            }
            let sequence_number = decode_sentinel(&row.document_key, &value)?;
            pending = Some((row.document_key, sequence_number));
        } else {
            match pending.take() {
                Some((candidate, _)) if candidate == row.document_key => {},
                // The pending document ended without a reference row.
                Some((candidate, sequence_number)) => {
                    if visitor(&candidate, sequence_number).is_break() {
                        return Ok(());
                    }
                },
                None => {},
            }
        }
    }

    if let Some((candidate, sequence_number)) = pending {
        let _ = visitor(&candidate, sequence_number);
    }
    Ok(())
}
