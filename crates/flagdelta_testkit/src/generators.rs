//! Property-based test generators using proptest.
//!
//! Revisions are drawn from a small pool of names and projects so that
//! sequences exercise overwrites, cancellations and project moves.

use flagdelta_protocol::{DeletedFeature, FeatureDefinition, FeatureFilter, Revision};
use proptest::prelude::*;

/// Feature names revisions are built from.
pub const NAME_POOL: &[&str] = &["alpha", "beta", "gamma", "delta", "epsilon", "zeta"];

/// Projects revisions are built from.
pub const PROJECT_POOL: &[&str] = &["web", "mobile", "backend"];

/// A single change inside a generated revision.
#[derive(Debug, Clone)]
pub enum FeatureOperation {
    /// Add or replace a feature.
    Update {
        /// Feature name.
        name: String,
        /// Project.
        project: String,
        /// Enabled flag.
        enabled: bool,
    },
    /// Remove a feature.
    Remove {
        /// Feature name.
        name: String,
        /// Project.
        project: String,
    },
}

/// Strategy for a name from [`NAME_POOL`].
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(NAME_POOL).prop_map(str::to_string)
}

/// Strategy for a project from [`PROJECT_POOL`].
pub fn project_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(PROJECT_POOL).prop_map(str::to_string)
}

/// Strategy for a single operation.
pub fn feature_operation_strategy() -> impl Strategy<Value = FeatureOperation> {
    prop_oneof![
        3 => (name_strategy(), project_strategy(), any::<bool>())
            .prop_map(|(name, project, enabled)| FeatureOperation::Update {
                name,
                project,
                enabled,
            }),
        2 => (name_strategy(), project_strategy())
            .prop_map(|(name, project)| FeatureOperation::Remove { name, project }),
    ]
}

/// Builds a revision from operations; later operations win within it.
pub fn revision_from_operations(revision_id: u64, operations: Vec<FeatureOperation>) -> Revision {
    let mut revision = Revision::new(revision_id);
    for operation in operations {
        match operation {
            FeatureOperation::Update {
                name,
                project,
                enabled,
            } => revision.update(FeatureDefinition::new(name, project).with_enabled(enabled)),
            FeatureOperation::Remove { name, project } => {
                revision.remove(DeletedFeature::new(name, project))
            }
        }
    }
    revision
}

/// Strategy for an ascending sequence of revisions.
///
/// Ids start at 1 and advance by 1..=3 so sequences contain gaps.
pub fn revision_sequence_strategy(
    min_revisions: usize,
    max_revisions: usize,
) -> impl Strategy<Value = Vec<Revision>> {
    prop::collection::vec(
        (1u64..=3, prop::collection::vec(feature_operation_strategy(), 0..5)),
        min_revisions..max_revisions,
    )
    .prop_map(|steps| {
        let mut next_id = 0u64;
        steps
            .into_iter()
            .map(|(gap, operations)| {
                next_id += gap;
                revision_from_operations(next_id, operations)
            })
            .collect()
    })
}

/// Strategy for a project filter: the wildcard, one or two projects, or none.
pub fn filter_strategy() -> impl Strategy<Value = FeatureFilter> {
    prop_oneof![
        2 => Just(FeatureFilter::all()),
        3 => project_strategy().prop_map(|p| FeatureFilter::projects([p])),
        1 => (project_strategy(), project_strategy())
            .prop_map(|(a, b)| FeatureFilter::projects([a, b])),
        1 => Just(FeatureFilter::projects(Vec::<String>::new())),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
