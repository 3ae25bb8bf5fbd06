//! Right-biased revision merge.
//!
//! Folding older revision A into newer revision B:
//! - a name in `B.updated` overrides any entry for it in `A.updated` or `A.removed`
//! - a name in `B.removed` overrides any entry for it in `A.updated`
//!
//! The merge is only meaningful in ascending revision order. Callers must
//! never reorder or parallelize a fold.

use flagdelta_protocol::{CompactedDelta, Revision};
use std::borrow::Borrow;
use std::sync::Arc;

/// Merges `newer` into the accumulated state `acc` in place.
///
/// After the call `acc` carries `newer`'s revision id.
pub fn merge_into(acc: &mut Revision, newer: &Revision) {
    debug_assert!(
        newer.revision_id >= acc.revision_id,
        "fold out of order: {} after {}",
        newer.revision_id,
        acc.revision_id
    );

    for (name, feature) in &newer.updated {
        acc.updated.insert(name.clone(), Arc::clone(feature));
    }
    for (name, deleted) in &newer.removed {
        acc.removed.insert(name.clone(), deleted.clone());
    }
    // Cancellation against the older side.
    for name in newer.removed.keys() {
        acc.updated.remove(name);
    }
    for name in newer.updated.keys() {
        acc.removed.remove(name);
    }
    acc.revision_id = newer.revision_id;
}

/// Merges two adjacent revisions into one tagged with `newer`'s id.
pub fn merge(older: &Revision, newer: &Revision) -> Revision {
    let mut merged = older.clone();
    merge_into(&mut merged, newer);
    merged
}

/// Folds an ascending sequence of revisions left to right.
///
/// Returns `None` for an empty sequence.
pub fn fold<I>(revisions: I) -> Option<CompactedDelta>
where
    I: IntoIterator,
    I::Item: Borrow<Revision>,
{
    let mut iter = revisions.into_iter();
    let mut acc = iter.next()?.borrow().clone();
    for revision in iter {
        merge_into(&mut acc, revision.borrow());
    }
    Some(acc)
}
