//! Reference model of an SDK client's materialized view.
//!
//! The model applies revisions one at a time, the way a client would if it
//! received every revision individually. Folded deltas are checked against
//! it.

use flagdelta_protocol::{ClientFeatureChange, FeatureDefinition, Revision};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A client's view: the last token it received and the features it holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientView {
    /// Last validator token received.
    pub revision_id: Option<u64>,
    /// Materialized features by name.
    pub features: BTreeMap<String, Arc<FeatureDefinition>>,
}

impl ClientView {
    /// An empty view with no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one revision: updates insert, removals delete.
    pub fn apply_revision(&mut self, revision: &Revision) {
        for (name, feature) in &revision.updated {
            self.features.insert(name.clone(), Arc::clone(feature));
        }
        for name in revision.removed.keys() {
            self.features.remove(name);
        }
        self.revision_id = Some(revision.revision_id);
    }

    /// Applies revisions in order.
    pub fn apply_all<'a>(&mut self, revisions: impl IntoIterator<Item = &'a Revision>) {
        for revision in revisions {
            self.apply_revision(revision);
        }
    }

    /// Applies a resolved change the way an SDK does.
    pub fn apply_change(&mut self, change: &ClientFeatureChange) {
        match change {
            ClientFeatureChange::Unchanged => {}
            ClientFeatureChange::Delta(delta) => self.apply_revision(delta),
            ClientFeatureChange::FullSnapshot(snapshot) => {
                self.features = snapshot.updated.clone();
                self.revision_id = Some(snapshot.revision_id);
            }
        }
    }

    /// Sorted feature names held.
    pub fn names(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    /// Returns true if the view holds `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }
}

/// Applies revisions one by one onto an empty view.
pub fn sequential_view<'a>(revisions: impl IntoIterator<Item = &'a Revision>) -> ClientView {
    let mut view = ClientView::new();
    view.apply_all(revisions);
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{removals, updates};

    #[test]
    fn apply_in_order() {
        let revisions = [
            updates(1, &[("a", "p"), ("b", "p")]),
            removals(2, &[("a", "p")]),
            updates(3, &[("c", "p")]),
        ];
        let view = sequential_view(&revisions);
        assert_eq!(view.names(), vec!["b", "c"]);
        assert_eq!(view.revision_id, Some(3));
    }

    #[test]
    fn snapshot_replaces_view() {
        let mut view = sequential_view(&[updates(1, &[("old", "p")])]);
        view.apply_change(&ClientFeatureChange::FullSnapshot(updates(5, &[("new", "p")])));
        assert_eq!(view.names(), vec!["new"]);
        assert_eq!(view.revision_id, Some(5));
    }

    #[test]
    fn unchanged_keeps_view() {
        let mut view = sequential_view(&[updates(1, &[("a", "p")])]);
        let before = view.clone();
        view.apply_change(&ClientFeatureChange::Unchanged);
        assert_eq!(view, before);
    }
}
