//! Per-environment revision log.

use crate::compaction::{compact_oldest, CompactionResult};
use crate::error::{CoreError, CoreResult};
use flagdelta_protocol::Revision;
use std::sync::Arc;
use tracing::debug;

/// Smallest capacity a log accepts; compaction needs two entries to merge.
pub const MIN_CAPACITY: usize = 2;

/// An ordered, capacity-bounded history of revisions for one environment.
///
/// The log is never empty: it is created from a base revision (usually a
/// full snapshot) and only ever shrinks by compaction. Entries are shared
/// behind `Arc`, so cloning a log to publish a new version copies pointers
/// only.
#[derive(Debug, Clone)]
pub struct RevisionLog {
    /// Revisions in ascending id order.
    entries: Vec<Arc<Revision>>,
    /// Soft upper bound on `entries.len()`.
    capacity: usize,
}

impl RevisionLog {
    /// Creates a log holding a single base revision.
    pub fn new(base: Revision, capacity: usize) -> Self {
        Self {
            entries: vec![Arc::new(base)],
            capacity: capacity.max(MIN_CAPACITY),
        }
    }

    /// Appends a revision, compacting first if the log is at capacity.
    ///
    /// The revision id must be strictly greater than the head's.
    pub fn append(&mut self, revision: Revision) -> CoreResult<()> {
        let head = self.head_revision_id();
        if revision.revision_id <= head {
            return Err(CoreError::NonMonotonicRevision {
                head,
                attempted: revision.revision_id,
            });
        }

        if self.entries.len() >= self.capacity {
            if let Some(result) = self.compact() {
                debug!(
                    evicted = result.evicted_revision_id,
                    base = result.base_revision_id,
                    base_changes = result.base_changes,
                    "compacted revision log"
                );
            }
        }

        self.entries.push(Arc::new(revision));
        Ok(())
    }

    /// Folds the two oldest entries together. No-op with fewer than two.
    pub fn compact(&mut self) -> Option<CompactionResult> {
        compact_oldest(&mut self.entries)
    }

    /// Returns true if a revision with this exact id is retained.
    pub fn has_revision(&self, revision_id: u64) -> bool {
        self.entries
            .binary_search_by_key(&revision_id, |r| r.revision_id)
            .is_ok()
    }

    /// Read-only view of all entries, oldest first.
    pub fn snapshot(&self) -> &[Arc<Revision>] {
        &self.entries
    }

    /// Entries strictly newer than `revision_id`, oldest first.
    pub fn since(&self, revision_id: u64) -> &[Arc<Revision>] {
        let start = self
            .entries
            .partition_point(|r| r.revision_id <= revision_id);
        &self.entries[start..]
    }

    /// The oldest retained revision.
    pub fn base(&self) -> &Revision {
        &self.entries[0]
    }

    /// The newest revision.
    pub fn head(&self) -> &Revision {
        &self.entries[self.entries.len() - 1]
    }

    /// Id of the base revision.
    pub fn base_revision_id(&self) -> u64 {
        self.base().revision_id
    }

    /// Id of the head revision.
    pub fn head_revision_id(&self) -> u64 {
        self.head().revision_id
    }

    /// Project of the newest entry mentioning `name`, updated or removed.
    pub fn last_known_project(&self, name: &str) -> Option<&str> {
        self.entries.iter().rev().find_map(|revision| {
            revision
                .updated
                .get(name)
                .map(|feature| feature.project.as_str())
                .or_else(|| revision.removed.get(name).map(|d| d.project.as_str()))
        })
    }

    /// Number of retained revisions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a log holds at least its base.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity before compaction kicks in.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
