//! In-memory feature store and change log.
//!
//! Both types are cheap to clone; clones share state, so a test or the
//! replay CLI can keep a handle for writing while the cache owns another.

use crate::error::{NotifierError, NotifierResult, StoreError, StoreResult};
use crate::notifier::{ChangeNotifier, ChangeSet};
use crate::store::FeatureStore;
use async_trait::async_trait;
use flagdelta_protocol::{ClientSegment, FeatureDefinition};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Default)]
struct StoreInner {
    /// environment -> name -> definition
    environments: RwLock<HashMap<String, BTreeMap<String, FeatureDefinition>>>,
    segments: RwLock<Vec<ClientSegment>>,
    failure: RwLock<Option<StoreError>>,
    latency: RwLock<Option<Duration>>,
    snapshot_calls: AtomicU64,
    by_name_calls: AtomicU64,
    segment_calls: AtomicU64,
}

/// Feature store backed by a map per environment.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeatureStore {
    inner: Arc<StoreInner>,
}

impl MemoryFeatureStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a definition in an environment.
    pub fn upsert(&self, environment: &str, feature: FeatureDefinition) {
        self.inner
            .environments
            .write()
            .entry(environment.to_string())
            .or_default()
            .insert(feature.name.clone(), feature);
    }

    /// Removes a definition, returning it if it existed.
    pub fn remove(&self, environment: &str, name: &str) -> Option<FeatureDefinition> {
        self.inner
            .environments
            .write()
            .get_mut(environment)
            .and_then(|features| features.remove(name))
    }

    /// Returns the current definition of `name`.
    pub fn get(&self, environment: &str, name: &str) -> Option<FeatureDefinition> {
        self.inner
            .environments
            .read()
            .get(environment)
            .and_then(|features| features.get(name).cloned())
    }

    /// Number of definitions held for an environment.
    pub fn feature_count(&self, environment: &str) -> usize {
        self.inner
            .environments
            .read()
            .get(environment)
            .map_or(0, BTreeMap::len)
    }

    /// Replaces the active segments.
    pub fn set_segments(&self, segments: Vec<ClientSegment>) {
        *self.inner.segments.write() = segments;
    }

    /// Makes every subsequent fetch fail with `error`, or clears the failure.
    pub fn set_failure(&self, error: Option<StoreError>) {
        *self.inner.failure.write() = error;
    }

    /// Delays every subsequent fetch, or clears the delay.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write() = latency;
    }

    /// Number of `fetch_snapshot` calls so far.
    pub fn snapshot_calls(&self) -> u64 {
        self.inner.snapshot_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_by_names` calls so far.
    pub fn by_name_calls(&self) -> u64 {
        self.inner.by_name_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_segments` calls so far.
    pub fn segment_calls(&self) -> u64 {
        self.inner.segment_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> StoreResult<()> {
        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.inner.failure.read().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeatureStore for MemoryFeatureStore {
    async fn fetch_snapshot(&self, environment: &str) -> StoreResult<Vec<FeatureDefinition>> {
        self.inner.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self
            .inner
            .environments
            .read()
            .get(environment)
            .map(|features| features.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_by_names(
        &self,
        names: &[String],
        environment: &str,
    ) -> StoreResult<Vec<FeatureDefinition>> {
        self.inner.by_name_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        let environments = self.inner.environments.read();
        let Some(features) = environments.get(environment) else {
            return Ok(Vec::new());
        };
        Ok(names
            .iter()
            .filter_map(|name| features.get(name).cloned())
            .collect())
    }

    async fn fetch_segments(&self) -> StoreResult<Vec<ClientSegment>> {
        self.inner.segment_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self.inner.segments.read().clone())
    }
}

/// One entry of the global change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    /// Global revision id.
    pub id: u64,
    /// Feature the change touched.
    pub feature_name: String,
}

#[derive(Debug)]
struct ChangeLogInner {
    entries: RwLock<Vec<ChangeEntry>>,
    failure: RwLock<Option<NotifierError>>,
    signal: watch::Sender<u64>,
}

/// Append-only change log that notifies subscribers on every append.
#[derive(Debug, Clone)]
pub struct MemoryChangeLog {
    inner: Arc<ChangeLogInner>,
}

impl Default for MemoryChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChangeLog {
    /// Creates an empty change log at revision 0.
    pub fn new() -> Self {
        let (signal, _) = watch::channel(0);
        Self {
            inner: Arc::new(ChangeLogInner {
                entries: RwLock::new(Vec::new()),
                failure: RwLock::new(None),
                signal,
            }),
        }
    }

    /// Records a change to one feature and signals subscribers.
    ///
    /// Returns the new global revision id.
    pub fn record(&self, feature_name: impl Into<String>) -> u64 {
        self.record_all([feature_name])
    }

    /// Records one change per name, then signals subscribers once.
    ///
    /// Returns the highest id assigned.
    pub fn record_all(&self, feature_names: impl IntoIterator<Item = impl Into<String>>) -> u64 {
        let latest = {
            let mut entries = self.inner.entries.write();
            let mut next = entries.last().map_or(0, |entry| entry.id);
            for name in feature_names {
                next += 1;
                entries.push(ChangeEntry {
                    id: next,
                    feature_name: name.into(),
                });
            }
            next
        };
        self.inner.signal.send_replace(latest);
        latest
    }

    /// Re-sends the current id without appending anything.
    pub fn notify(&self) {
        let latest = self.latest_id();
        self.inner.signal.send_replace(latest);
    }

    /// Highest id recorded, or 0.
    pub fn latest_id(&self) -> u64 {
        self.inner.entries.read().last().map_or(0, |entry| entry.id)
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Makes every subsequent query fail with `error`, or clears the failure.
    pub fn set_failure(&self, error: Option<NotifierError>) {
        *self.inner.failure.write() = error;
    }

    fn check_failure(&self) -> NotifierResult<()> {
        match self.inner.failure.read().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChangeNotifier for MemoryChangeLog {
    async fn current_revision_id(&self) -> NotifierResult<u64> {
        self.check_failure()?;
        Ok(self.latest_id())
    }

    async fn changed_names_since(&self, previous_id: u64) -> NotifierResult<ChangeSet> {
        self.check_failure()?;
        let entries = self.inner.entries.read();
        let start = entries.partition_point(|entry| entry.id <= previous_id);

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for entry in &entries[start..] {
            if seen.insert(entry.feature_name.as_str()) {
                names.push(entry.feature_name.clone());
            }
        }
        let latest_id = entries.last().map_or(0, |entry| entry.id).max(previous_id);
        Ok(ChangeSet::new(latest_id, names))
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.signal.subscribe()
    }
}
