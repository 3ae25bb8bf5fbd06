//! Feature definitions as served to SDK clients.
//!
//! These values are opaque to the delta engine: they are captured from the
//! backing store, copied into revisions and handed back out unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A materialized feature definition for one environment.
///
/// `name` is unique within a project. A definition is a value snapshot:
/// once captured into a revision it is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDefinition {
    /// Feature name.
    pub name: String,
    /// Feature type (release, experiment, ...).
    #[serde(rename = "type", default = "default_feature_type")]
    pub feature_type: String,
    /// Owning project id.
    pub project: String,
    /// Whether the feature is enabled in this environment.
    pub enabled: bool,
    /// Whether the feature is marked stale.
    #[serde(default)]
    pub stale: bool,
    /// Activation strategies, in evaluation order.
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// Feature variants.
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Parent features this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether SDKs should emit impression events.
    #[serde(default)]
    pub impression_data: bool,
}

fn default_feature_type() -> String {
    "release".to_string()
}

impl FeatureDefinition {
    /// Creates an enabled release feature with no strategies.
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feature_type: default_feature_type(),
            project: project.into(),
            enabled: true,
            stale: false,
            strategies: Vec::new(),
            variants: Vec::new(),
            dependencies: Vec::new(),
            description: None,
            impression_data: false,
        }
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the feature type.
    pub fn with_type(mut self, feature_type: impl Into<String>) -> Self {
        self.feature_type = feature_type.into();
        self
    }

    /// Appends a strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Appends a variant.
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Appends a dependency on a parent feature.
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the feature stale.
    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    /// Enables impression data.
    pub fn with_impression_data(mut self, impression_data: bool) -> Self {
        self.impression_data = impression_data;
        self
    }
}

/// An activation strategy attached to a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    /// Strategy name (e.g. `default`, `flexibleRollout`).
    pub name: String,
    /// Strategy parameters, stringly typed as SDKs expect them.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Constraints that gate the strategy.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Segment ids referenced by the strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<u32>,
    /// Strategy-level variants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl Strategy {
    /// Creates a strategy with no parameters or constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
            constraints: Vec::new(),
            segments: Vec::new(),
            variants: Vec::new(),
        }
    }

    /// Adds a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Adds a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Adds a segment reference.
    pub fn with_segment(mut self, segment_id: u32) -> Self {
        self.segments.push(segment_id);
        self
    }
}

/// A constraint on a context field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    /// Context field the constraint reads.
    pub context_name: String,
    /// Operator name (`IN`, `STR_STARTS_WITH`, ...).
    pub operator: String,
    /// Values for list operators.
    #[serde(default)]
    pub values: Vec<String>,
    /// Value for single-value operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the result is negated.
    #[serde(default)]
    pub inverted: bool,
    /// Whether string comparison ignores case.
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Constraint {
    /// Creates an `IN` constraint.
    pub fn one_of(
        context_name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            context_name: context_name.into(),
            operator: "IN".to_string(),
            values: values.into_iter().map(Into::into).collect(),
            value: None,
            inverted: false,
            case_insensitive: false,
        }
    }
}

/// A reusable set of constraints, referenced by id from strategies.
///
/// Segments are global rather than per environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSegment {
    /// Segment id, as listed in [`Strategy::segments`].
    pub id: u32,
    /// Segment name.
    pub name: String,
    /// Constraints a context must satisfy to be in the segment.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl ClientSegment {
    /// Creates a segment with no constraints.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            constraints: Vec::new(),
        }
    }

    /// Appends a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A feature or strategy variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Variant name.
    pub name: String,
    /// Relative weight (out of 1000).
    pub weight: u32,
    /// `variable` or `fix`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_type: Option<String>,
    /// Context field used for stickiness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickiness: Option<String>,
    /// Payload delivered with the variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<VariantPayload>,
}

impl Variant {
    /// Creates a variable-weight variant with no payload.
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            weight_type: Some("variable".to_string()),
            stickiness: None,
            payload: None,
        }
    }

    /// Attaches a payload.
    pub fn with_payload(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload = Some(VariantPayload {
            kind: kind.into(),
            value: value.into(),
        });
        self
    }
}

/// Payload attached to a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPayload {
    /// Payload type (`string`, `json`, `csv`, `number`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload value.
    pub value: String,
}

/// Dependency on a parent feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Parent feature name.
    pub feature: String,
    /// Required parent enabled state.
    pub enabled: bool,
    /// Parent variants that satisfy the dependency (only when enabled).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,
}
