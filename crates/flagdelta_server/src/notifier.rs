//! Change notifier seam.

use crate::error::NotifierResult;
use async_trait::async_trait;
use tokio::sync::watch;

/// Names changed over a range of the global change log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Highest global revision id covered by this set.
    pub latest_id: u64,
    /// Distinct feature names changed after the requested id, in log order.
    pub names: Vec<String>,
}

impl ChangeSet {
    /// Creates a change set.
    pub fn new(latest_id: u64, names: Vec<String>) -> Self {
        Self { latest_id, names }
    }

    /// Returns true if no feature names changed.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Tracks the global revision id over an append-only change log.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Current maximum global revision id.
    async fn current_revision_id(&self) -> NotifierResult<u64>;

    /// Feature names changed strictly after `previous_id`.
    async fn changed_names_since(&self, previous_id: u64) -> NotifierResult<ChangeSet>;

    /// Subscribes to "id advanced" signals.
    ///
    /// The receiver holds the latest observed id. Bursts coalesce into one
    /// wake-up and a wake-up may repeat an id already seen, so receivers
    /// must tolerate redundant signals.
    fn subscribe(&self) -> watch::Receiver<u64>;
}
