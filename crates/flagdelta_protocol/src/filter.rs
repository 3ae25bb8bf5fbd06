//! Client scoping: which projects and names a client can see.

use serde::{Deserialize, Serialize};

/// Project wildcard: a filter containing it sees every project.
pub const ALL_PROJECTS: &str = "*";

/// Environment used when a query names none.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Visibility filter applied to each revision before folding.
///
/// A feature or tombstone is visible when its project is accepted and its
/// name starts with the optional prefix. An empty project list accepts
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFilter {
    /// Accepted project ids, or [`ALL_PROJECTS`].
    pub projects: Vec<String>,
    /// Optional name prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

impl FeatureFilter {
    /// A filter that accepts everything.
    pub fn all() -> Self {
        Self {
            projects: vec![ALL_PROJECTS.to_string()],
            name_prefix: None,
        }
    }

    /// A filter over the given projects.
    pub fn projects(projects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            projects: projects.into_iter().map(Into::into).collect(),
            name_prefix: None,
        }
    }

    /// Restricts the filter to names starting with `prefix`.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Returns true if the filter contains the project wildcard.
    pub fn is_all_projects(&self) -> bool {
        self.projects.iter().any(|p| p == ALL_PROJECTS)
    }

    /// Returns true if the filter lets everything through unchanged.
    pub fn is_pass_through(&self) -> bool {
        self.is_all_projects() && self.name_prefix.as_deref().map_or(true, str::is_empty)
    }

    /// Returns true if a feature with this name and project is visible.
    pub fn accepts(&self, name: &str, project: &str) -> bool {
        let prefix_ok = self
            .name_prefix
            .as_deref()
            .map_or(true, |prefix| name.starts_with(prefix));
        prefix_ok && (self.is_all_projects() || self.projects.iter().any(|p| p == project))
    }
}

impl Default for FeatureFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// A client's delta query: environment plus visibility filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaQuery {
    /// Environment the client is scoped to.
    pub environment: String,
    /// Project and name scoping.
    pub filter: FeatureFilter,
}

impl DeltaQuery {
    /// Creates a query over every project of an environment.
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            filter: FeatureFilter::all(),
        }
    }

    /// Restricts the query to the given projects.
    pub fn with_projects(mut self, projects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filter.projects = projects.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the query to names starting with `prefix`.
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filter.name_prefix = Some(prefix.into());
        self
    }
}

impl Default for DeltaQuery {
    fn default() -> Self {
        Self::new(DEFAULT_ENVIRONMENT)
    }
}
