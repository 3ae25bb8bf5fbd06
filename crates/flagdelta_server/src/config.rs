//! Cache configuration.

use flagdelta_core::MIN_CAPACITY;
use flagdelta_protocol::DEFAULT_ENVIRONMENT;
use std::time::Duration;

/// Configuration for the delta cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Revisions retained per environment before compaction.
    pub capacity: usize,
    /// Environments populated eagerly on start.
    pub environments: Vec<String>,
    /// Timeout for every backing store and notifier call.
    pub fetch_timeout: Duration,
    /// Serve a snapshot built from the log when the store cannot provide one.
    pub snapshot_fallback: bool,
}

impl CacheConfig {
    /// Creates a configuration with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_CAPACITY),
            environments: vec![DEFAULT_ENVIRONMENT.to_string()],
            fetch_timeout: Duration::from_secs(10),
            snapshot_fallback: true,
        }
    }

    /// Sets the per-environment capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(MIN_CAPACITY);
        self
    }

    /// Sets the environments populated on start.
    pub fn with_environments(
        mut self,
        environments: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.environments = environments.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enables or disables the log-built snapshot fallback.
    pub fn with_snapshot_fallback(mut self, enabled: bool) -> Self {
        self.snapshot_fallback = enabled;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(100)
    }
}
