//! Delta resolution against a revision log.

use crate::fold::fold;
use crate::log::RevisionLog;
use flagdelta_protocol::{CompactedDelta, FeatureFilter};
use tracing::trace;

/// Outcome of resolving a client token against a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The client already holds the head revision.
    Unchanged,
    /// Net visible changes since the client's revision.
    Delta(CompactedDelta),
    /// The token is absent, zero, or older than the base; the caller must
    /// serve a full snapshot tagged with `head`.
    SnapshotRequired {
        /// Head revision id to tag the snapshot with.
        head: u64,
    },
}

/// Resolves what changed for a client since `client_revision`.
///
/// Each selected revision is filtered first and the filtered revisions are
/// then folded in ascending order. An empty project list yields an empty
/// delta, not an error.
pub fn resolve(
    log: &RevisionLog,
    client_revision: Option<u64>,
    filter: &FeatureFilter,
) -> Resolution {
    let head = log.head_revision_id();
    let client = match client_revision {
        None | Some(0) => return Resolution::SnapshotRequired { head },
        Some(id) => id,
    };

    if client >= head {
        return Resolution::Unchanged;
    }
    if client < log.base_revision_id() {
        trace!(client, base = log.base_revision_id(), "client revision evicted");
        return Resolution::SnapshotRequired { head };
    }
    if !log.has_revision(client) {
        trace!(client, "client revision not retained; folding from next newer entry");
    }

    let selected = log.since(client);
    match fold(selected.iter().map(|revision| revision.filtered(filter))) {
        Some(delta) => Resolution::Delta(delta),
        // client < head guarantees a non-empty selection
        None => Resolution::Unchanged,
    }
}

/// Full visible state at the head of the log.
///
/// Unlike a delta, the filter applies to the net state: every retained
/// revision is folded unfiltered, tombstones are dropped and only then is
/// the filter applied. A feature that moved out of a project is therefore
/// absent for that project, as it would be in a fresh snapshot fetch.
pub fn materialize(log: &RevisionLog, filter: &FeatureFilter) -> CompactedDelta {
    let mut state = fold(log.snapshot().iter().map(|revision| &**revision))
        .unwrap_or_else(|| CompactedDelta::new(log.head_revision_id()));
    state.removed.clear();
    state.filtered(filter)
}
