//! Benchmark utilities.

#![warn(missing_docs)]

use flagdelta_core::RevisionLog;
use flagdelta_protocol::{DeletedFeature, FeatureDefinition, Revision, Strategy};
use rand::Rng;

/// Projects workloads spread features over.
pub const PROJECTS: &[&str] = &["web", "mobile", "backend", "data"];

/// Name of the feature with the given index.
pub fn feature_name(index: usize) -> String {
    format!("feature-{index:05}")
}

/// A feature with one rollout strategy, roughly the size SDKs receive.
pub fn feature(index: usize) -> FeatureDefinition {
    FeatureDefinition::new(feature_name(index), PROJECTS[index % PROJECTS.len()]).with_strategy(
        Strategy::new("flexibleRollout")
            .with_parameter("rollout", "50")
            .with_parameter("stickiness", "default"),
    )
}

/// A base snapshot holding `feature_count` features.
pub fn snapshot(revision_id: u64, feature_count: usize) -> Revision {
    Revision::snapshot(revision_id, (0..feature_count).map(feature))
}

/// A revision touching `changes` random features out of `feature_count`.
///
/// About one change in five is a removal.
pub fn random_revision(revision_id: u64, feature_count: usize, changes: usize) -> Revision {
    let mut rng = rand::thread_rng();
    let mut revision = Revision::new(revision_id);
    for _ in 0..changes {
        let index = rng.gen_range(0..feature_count);
        if rng.gen_bool(0.2) {
            let project = PROJECTS[index % PROJECTS.len()];
            revision.remove(DeletedFeature::new(feature_name(index), project));
        } else {
            revision.update(feature(index).with_enabled(rng.gen()));
        }
    }
    revision
}

/// `count` consecutive random revisions starting at `first_id`.
pub fn random_revisions(
    first_id: u64,
    count: usize,
    feature_count: usize,
    changes: usize,
) -> Vec<Revision> {
    (0..count as u64)
        .map(|offset| random_revision(first_id + offset, feature_count, changes))
        .collect()
}

/// A full log: a snapshot base followed by `capacity - 1` random revisions.
pub fn full_log(capacity: usize, feature_count: usize, changes: usize) -> RevisionLog {
    let mut log = RevisionLog::new(snapshot(1, feature_count), capacity);
    for revision in random_revisions(2, capacity.saturating_sub(1), feature_count, changes) {
        // Ids ascend by construction.
        let _ = log.append(revision);
    }
    log
}
