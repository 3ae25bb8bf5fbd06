//! Error types for the delta cache and its collaborators.

use flagdelta_core::CoreError;
use thiserror::Error;

/// Result type for backing store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for change notifier calls.
pub type NotifierResult<T> = Result<T, NotifierError>;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors reported by a backing feature store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("feature store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the query.
    #[error("feature store query failed: {0}")]
    Query(String),
}

/// Errors reported by a change notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    /// The change log could not be read.
    #[error("change notifier unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur in the delta cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Change notifier failure.
    #[error(transparent)]
    Notifier(#[from] NotifierError),

    /// Revision log invariant violated.
    #[error("revision log error: {0}")]
    Core(#[from] CoreError),

    /// A collaborator call exceeded the configured timeout.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// The environment has no revision log.
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// The refresh task could not be joined.
    #[error("refresh task failed: {0}")]
    Task(String),
}

impl CacheError {
    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CacheError::Store(StoreError::Unavailable(_))
                | CacheError::Notifier(_)
                | CacheError::Timeout(_)
        )
    }
}
