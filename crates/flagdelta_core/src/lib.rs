//! # flagdelta Core
//!
//! In-memory revision history and delta resolution.
//!
//! This crate provides:
//! - [`RevisionLog`]: a capacity-bounded, ascending list of revisions for
//!   one environment
//! - Compaction of the two oldest revisions when the log is full
//! - [`fold`]: the right-biased, last-writer-wins merge of revisions
//! - [`resolve`]: "what changed since revision R for these projects"
//!
//! ## Key Invariants
//!
//! - Revision ids strictly increase within a log
//! - `log[0]` is the base: any client token older than it needs a full snapshot
//! - Folding only ever runs in ascending revision order
//! - Filtering by project happens per revision, before folding
//! - Compaction never changes the net effect of folding the whole log
//!
//! Everything here is synchronous and free of locks; the orchestrator in
//! `flagdelta_server` publishes logs by swapping whole values.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod compaction;
mod error;
pub mod fold;
mod log;
mod resolver;

pub use compaction::CompactionResult;
pub use error::{CoreError, CoreResult};
pub use fold::{fold, merge, merge_into};
pub use log::{RevisionLog, MIN_CAPACITY};
pub use resolver::{materialize, resolve, Resolution};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
