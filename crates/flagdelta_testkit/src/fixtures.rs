//! Test fixtures.
//!
//! Short constructors for the shapes tests build over and over.

use flagdelta_protocol::{
    Constraint, DeletedFeature, FeatureDefinition, Revision, Strategy, Variant,
};

/// An enabled feature with a default strategy.
pub fn feature(name: &str, project: &str) -> FeatureDefinition {
    FeatureDefinition::new(name, project).with_strategy(Strategy::new("default"))
}

/// A disabled feature.
pub fn disabled_feature(name: &str, project: &str) -> FeatureDefinition {
    feature(name, project).with_enabled(false)
}

/// A feature carrying the full set of optional parts.
pub fn rich_feature(name: &str, project: &str) -> FeatureDefinition {
    FeatureDefinition::new(name, project)
        .with_type("experiment")
        .with_description(format!("{name} experiment"))
        .with_impression_data(true)
        .with_strategy(
            Strategy::new("flexibleRollout")
                .with_parameter("rollout", "25")
                .with_parameter("stickiness", "default")
                .with_constraint(Constraint::one_of("region", ["eu-west", "us-east"]))
                .with_segment(1),
        )
        .with_variant(Variant::new("control", 500))
        .with_variant(Variant::new("treatment", 500).with_payload("json", r#"{"color":"blue"}"#))
}

/// A tombstone.
pub fn tombstone(name: &str, project: &str) -> DeletedFeature {
    DeletedFeature::new(name, project)
}

/// A revision updating `(name, project)` pairs.
pub fn updates(revision_id: u64, features: &[(&str, &str)]) -> Revision {
    let mut revision = Revision::new(revision_id);
    for (name, project) in features {
        revision.update(feature(name, project));
    }
    revision
}

/// A revision removing `(name, project)` pairs.
pub fn removals(revision_id: u64, features: &[(&str, &str)]) -> Revision {
    let mut revision = Revision::new(revision_id);
    for (name, project) in features {
        revision.remove(tombstone(name, project));
    }
    revision
}

/// Sorted names of the updated entries.
pub fn updated_names(revision: &Revision) -> Vec<String> {
    revision.updated.keys().cloned().collect()
}

/// Sorted names of the removed entries.
pub fn removed_names(revision: &Revision) -> Vec<String> {
    revision.removed.keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_and_removals() {
        let up = updates(3, &[("a", "p"), ("b", "q")]);
        assert_eq!(up.revision_id, 3);
        assert_eq!(updated_names(&up), vec!["a", "b"]);

        let down = removals(4, &[("a", "p")]);
        assert_eq!(removed_names(&down), vec!["a"]);
        assert_eq!(down.removed["a"].project, "p");
    }

    #[test]
    fn rich_feature_has_parts() {
        let f = rich_feature("exp", "lab");
        assert_eq!(f.strategies.len(), 1);
        assert_eq!(f.variants.len(), 2);
        assert!(f.impression_data);
    }
}
