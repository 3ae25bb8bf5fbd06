//! Delta wire schema.
//!
//! A delta response body is a list of events. A full snapshot is a single
//! `hydration` event carrying the features and the active segments; a delta
//! is one `feature-updated` event per updated feature followed by one
//! `feature-removed` event per tombstone.
//!
//! Tombstones keep their project inside the revision log so project filters
//! can see them, but the project is not sent to clients.

use crate::feature::{ClientSegment, FeatureDefinition};
use crate::revision::{ClientFeatureChange, CompactedDelta};
use serde::{Deserialize, Serialize};

/// A single event in a delta response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeltaEvent {
    /// Full state of the environment at `event_id`.
    #[serde(rename_all = "camelCase")]
    Hydration {
        /// Revision id the snapshot is tagged with.
        event_id: u64,
        /// Every visible feature.
        features: Vec<FeatureDefinition>,
        /// Segments the features' strategies may refer to.
        #[serde(default)]
        segments: Vec<ClientSegment>,
    },
    /// A feature was added or changed.
    #[serde(rename_all = "camelCase")]
    FeatureUpdated {
        /// Revision id of the delta.
        event_id: u64,
        /// Current definition.
        feature: FeatureDefinition,
    },
    /// A feature was removed.
    #[serde(rename_all = "camelCase")]
    FeatureRemoved {
        /// Revision id of the delta.
        event_id: u64,
        /// Removed feature name.
        feature_name: String,
    },
}

impl DeltaEvent {
    /// Revision id carried by the event.
    pub fn event_id(&self) -> u64 {
        match self {
            DeltaEvent::Hydration { event_id, .. }
            | DeltaEvent::FeatureUpdated { event_id, .. }
            | DeltaEvent::FeatureRemoved { event_id, .. } => *event_id,
        }
    }
}

/// Body of a delta response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFeaturesDelta {
    /// Events in application order.
    pub events: Vec<DeltaEvent>,
}

impl ClientFeaturesDelta {
    /// Builds a hydration body from a snapshot and the active segments.
    pub fn hydration(snapshot: &CompactedDelta, segments: &[ClientSegment]) -> Self {
        Self {
            events: vec![DeltaEvent::Hydration {
                event_id: snapshot.revision_id,
                features: snapshot
                    .updated
                    .values()
                    .map(|feature| feature.as_ref().clone())
                    .collect(),
                segments: segments.to_vec(),
            }],
        }
    }

    /// Builds an event list from a folded delta.
    pub fn from_delta(delta: &CompactedDelta) -> Self {
        let event_id = delta.revision_id;
        let updated = delta
            .updated
            .values()
            .map(|feature| DeltaEvent::FeatureUpdated {
                event_id,
                feature: feature.as_ref().clone(),
            });
        let removed = delta
            .removed
            .values()
            .map(|deleted| DeltaEvent::FeatureRemoved {
                event_id,
                feature_name: deleted.name.clone(),
            });
        Self {
            events: updated.chain(removed).collect(),
        }
    }

    /// Builds a body for a change; `None` for [`ClientFeatureChange::Unchanged`].
    ///
    /// `segments` only goes into a hydration event.
    pub fn from_change(change: &ClientFeatureChange, segments: &[ClientSegment]) -> Option<Self> {
        match change {
            ClientFeatureChange::Unchanged => None,
            ClientFeatureChange::Delta(delta) => Some(Self::from_delta(delta)),
            ClientFeatureChange::FullSnapshot(snapshot) => {
                Some(Self::hydration(snapshot, segments))
            }
        }
    }

    /// Returns true if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
