//! # flagdelta Protocol
//!
//! Data types shared by every flagdelta crate.
//!
//! This crate provides:
//! - `FeatureDefinition` and its strategy/variant/dependency parts
//! - `ClientSegment`, the shared constraint sets strategies refer to
//! - `Revision` and `DeletedFeature` for the revision log
//! - `ClientFeatureChange`, the outcome of a delta query
//! - `FeatureFilter` and `DeltaQuery` for project and name scoping
//! - The delta wire schema (`ClientFeaturesDelta`, `DeltaEvent`)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod feature;
mod filter;
mod messages;
mod revision;

pub use feature::{
    ClientSegment, Constraint, Dependency, FeatureDefinition, Strategy, Variant, VariantPayload,
};
pub use filter::{DeltaQuery, FeatureFilter, ALL_PROJECTS, DEFAULT_ENVIRONMENT};
pub use messages::{ClientFeaturesDelta, DeltaEvent};
pub use revision::{ClientFeatureChange, CompactedDelta, DeletedFeature, Revision};
