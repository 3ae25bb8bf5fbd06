//! Revision log compaction.
//!
//! When a log reaches capacity its two oldest revisions are folded into one
//! new base tagged with the newer id. This bounds memory to O(capacity)
//! regardless of change volume.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change the net effect of folding the whole log
//! - The new base answers "everything after its revision id"
//! - Client tokens older than the new base fall back to a full snapshot

use crate::fold::merge;
use flagdelta_protocol::Revision;
use std::sync::Arc;

/// Result of a compaction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionResult {
    /// Base revision id before compaction (now evicted).
    pub evicted_revision_id: u64,
    /// Revision id of the new base.
    pub base_revision_id: u64,
    /// Number of entries before compaction.
    pub entries_before: usize,
    /// Number of entries in the new base.
    pub base_changes: usize,
}

/// Folds the two oldest entries into one. No-op with fewer than two entries.
pub(crate) fn compact_oldest(entries: &mut Vec<Arc<Revision>>) -> Option<CompactionResult> {
    if entries.len() < 2 {
        return None;
    }
    let entries_before = entries.len();
    let merged = merge(&entries[0], &entries[1]);
    let result = CompactionResult {
        evicted_revision_id: entries[0].revision_id,
        base_revision_id: merged.revision_id,
        entries_before,
        base_changes: merged.change_count(),
    };
    entries.splice(0..2, std::iter::once(Arc::new(merged)));
    Some(result)
}
