//! Backing feature store seam.

use crate::error::StoreResult;
use async_trait::async_trait;
use flagdelta_protocol::{ClientSegment, FeatureDefinition};

/// Source of truth for materialized feature definitions.
///
/// Implementations query whatever persists features (a database read
/// model, a remote API). The cache only ever reads through this trait.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Returns the full current state of one environment.
    async fn fetch_snapshot(&self, environment: &str) -> StoreResult<Vec<FeatureDefinition>>;

    /// Returns the current definitions for a subset of names.
    ///
    /// Names missing from the result no longer exist and are treated as
    /// removals.
    async fn fetch_by_names(
        &self,
        names: &[String],
        environment: &str,
    ) -> StoreResult<Vec<FeatureDefinition>>;

    /// Returns the segments currently in use by client-facing strategies.
    async fn fetch_segments(&self) -> StoreResult<Vec<ClientSegment>>;
}
