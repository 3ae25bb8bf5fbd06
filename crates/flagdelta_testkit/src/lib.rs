//! # flagdelta Testkit
//!
//! Test utilities for flagdelta.
//!
//! This crate provides:
//! - Fixtures for building features and revisions tersely
//! - Property-based test generators using proptest
//! - A sequential reference model of a client's materialized view
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flagdelta_testkit::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn fold_matches_model(revisions in revision_sequence_strategy(1, 8)) {
//!         // ...
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
