//! # flagdelta Server
//!
//! Incremental feature-configuration cache for SDK polling.
//!
//! This crate provides:
//! - [`DeltaCache`]: one revision log per environment, kept in step with a
//!   backing store by a background refresh task
//! - [`FeatureStore`] and [`ChangeNotifier`]: the seams to the backing store
//!   and the global change log, with in-memory implementations
//! - [`DeltaHandler`]: maps cache outcomes onto conditional responses
//!
//! # Architecture
//!
//! ```text
//! ChangeNotifier --signal--> refresh() --fetch_by_names--> FeatureStore
//!                                |
//!                                v
//!                     publish new logs (one swap)
//!                                ^
//! client poll --> resolve_delta() --load--> resolver
//! ```
//!
//! Readers never lock. A refresh fetches every environment concurrently with
//! no lock held, then takes a short publish lock to swap the new logs in at
//! once. A failed refresh publishes nothing and the next signal retries from
//! the same revision. Hydrations also carry the segment set, which is loaded
//! on first use and reloaded whenever a refresh advances.
//!
//! # Example
//!
//! ```rust,ignore
//! use flagdelta_server::{CacheConfig, DeltaCache, MemoryChangeLog, MemoryFeatureStore};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(DeltaCache::new(CacheConfig::default(), store, changes));
//! let task = cache.start().await;
//! let change = cache.resolve_delta(Some(41), &DeltaQuery::default()).await?;
//! task.stop().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cache;
mod config;
mod error;
mod handler;
pub mod memory;
mod notifier;
mod store;

pub use cache::{CacheState, DeltaCache, RefreshOutcome, RefreshTask};
pub use config::CacheConfig;
pub use error::{
    CacheError, CacheResult, NotifierError, NotifierResult, StoreError, StoreResult,
};
pub use handler::{format_validator, parse_validator, DeltaHandler, DeltaResponse};
pub use memory::{ChangeEntry, MemoryChangeLog, MemoryFeatureStore};
pub use notifier::{ChangeNotifier, ChangeSet};
pub use store::FeatureStore;
