//! Revisions and delta outcomes.

use crate::feature::FeatureDefinition;
use crate::filter::FeatureFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tombstone: remove `name` from the client's materialized view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletedFeature {
    /// Feature name.
    pub name: String,
    /// Project the feature belonged to when it was removed.
    pub project: String,
}

impl DeletedFeature {
    /// Creates a tombstone.
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
        }
    }
}

/// One atomic set of feature updates and removals.
///
/// Names are unique within `updated` and within `removed`. Definitions are
/// shared behind `Arc` so copying a revision never deep-copies features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    /// Global revision id, strictly increasing within a log.
    pub revision_id: u64,
    /// Features added or changed, by name.
    pub updated: BTreeMap<String, Arc<FeatureDefinition>>,
    /// Features removed, by name.
    pub removed: BTreeMap<String, DeletedFeature>,
}

/// The fold of a contiguous range of revisions, tagged with the newest id.
pub type CompactedDelta = Revision;

impl Revision {
    /// Creates an empty revision.
    pub fn new(revision_id: u64) -> Self {
        Self {
            revision_id,
            updated: BTreeMap::new(),
            removed: BTreeMap::new(),
        }
    }

    /// Creates a base revision holding a full snapshot.
    pub fn snapshot(
        revision_id: u64,
        features: impl IntoIterator<Item = FeatureDefinition>,
    ) -> Self {
        let mut revision = Self::new(revision_id);
        for feature in features {
            revision.update(feature);
        }
        revision
    }

    /// Records an update, replacing any earlier entry for the name.
    pub fn update(&mut self, feature: FeatureDefinition) {
        self.removed.remove(&feature.name);
        self.updated.insert(feature.name.clone(), Arc::new(feature));
    }

    /// Records a removal, replacing any earlier entry for the name.
    pub fn remove(&mut self, deleted: DeletedFeature) {
        self.updated.remove(&deleted.name);
        self.removed.insert(deleted.name.clone(), deleted);
    }

    /// Builder form of [`Revision::update`].
    pub fn with_updated(mut self, feature: FeatureDefinition) -> Self {
        self.update(feature);
        self
    }

    /// Builder form of [`Revision::remove`].
    pub fn with_removed(mut self, deleted: DeletedFeature) -> Self {
        self.remove(deleted);
        self
    }

    /// Returns true if the revision carries no changes.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }

    /// Number of updated plus removed entries.
    pub fn change_count(&self) -> usize {
        self.updated.len() + self.removed.len()
    }

    /// Returns a copy restricted to entries the filter accepts.
    pub fn filtered(&self, filter: &FeatureFilter) -> Revision {
        if filter.is_pass_through() {
            return self.clone();
        }
        Revision {
            revision_id: self.revision_id,
            updated: self
                .updated
                .iter()
                .filter(|(name, feature)| filter.accepts(name, &feature.project))
                .map(|(name, feature)| (name.clone(), Arc::clone(feature)))
                .collect(),
            removed: self
                .removed
                .iter()
                .filter(|(name, deleted)| filter.accepts(name, &deleted.project))
                .map(|(name, deleted)| (name.clone(), deleted.clone()))
                .collect(),
        }
    }
}

/// Result of resolving a client's validator token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFeatureChange {
    /// The client already holds the head revision.
    Unchanged,
    /// Net changes since the client's revision.
    Delta(CompactedDelta),
    /// The client's revision is absent or aged out; full state at head.
    FullSnapshot(CompactedDelta),
}

impl ClientFeatureChange {
    /// The validator token to hand back, if the body carries one.
    pub fn revision_id(&self) -> Option<u64> {
        match self {
            ClientFeatureChange::Unchanged => None,
            ClientFeatureChange::Delta(delta) | ClientFeatureChange::FullSnapshot(delta) => {
                Some(delta.revision_id)
            }
        }
    }

    /// Returns true for [`ClientFeatureChange::Unchanged`].
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ClientFeatureChange::Unchanged)
    }

    /// Returns true for [`ClientFeatureChange::FullSnapshot`].
    pub fn is_full_snapshot(&self) -> bool {
        matches!(self, ClientFeatureChange::FullSnapshot(_))
    }

    /// The carried revision body, if any.
    pub fn body(&self) -> Option<&CompactedDelta> {
        match self {
            ClientFeatureChange::Unchanged => None,
            ClientFeatureChange::Delta(delta) | ClientFeatureChange::FullSnapshot(delta) => {
                Some(delta)
            }
        }
    }
}
