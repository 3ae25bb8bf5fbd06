//! The delta cache: per-environment revision logs kept in step with the
//! backing store.
//!
//! # Publication
//!
//! Logs live in an `ArcSwap<HashMap<..>>`. Readers load the current map
//! without locking and resolve against whatever version they loaded. A
//! writer (refresh, population or reset) builds a new map next to the old
//! one and swaps it in under the `publish` mutex, so a reader sees either
//! the whole refresh or none of it. No lock is held across a store or
//! notifier call; the publish section is synchronous.
//!
//! # Refresh coalescing
//!
//! One refresh runs at a time. A trigger arriving while one runs sets
//! `refresh_requested` and returns [`RefreshOutcome::Coalesced`]; the
//! running refresh keeps taking passes until no request is pending, so a
//! coalesced trigger is never dropped.
//!
//! # Cold start
//!
//! Population does not block refresh. Concurrent first requests for one
//! environment share a per-environment slot and a single snapshot fetch. A
//! log installed below the recorded revision id, or while a refresh pass
//! was in flight, pulls the recorded id back to its head so the next pass
//! covers the changes it missed.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::notifier::{ChangeNotifier, ChangeSet};
use crate::store::FeatureStore;
use arc_swap::{ArcSwap, ArcSwapOption};
use flagdelta_core::{materialize, resolve, Resolution, RevisionLog};
use flagdelta_protocol::{
    ClientFeatureChange, ClientSegment, CompactedDelta, DeletedFeature, DeltaQuery,
    FeatureDefinition, FeatureFilter, Revision,
};
use futures::future::try_join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type LogMap = HashMap<String, Arc<RevisionLog>>;

/// Lifecycle of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No environment has been populated.
    Uninitialized,
    /// The first base snapshot is being fetched.
    PopulatingBase,
    /// At least one environment is served from its log.
    Ready,
}

impl CacheState {
    /// Returns true if requests can be served from a log.
    pub fn is_ready(&self) -> bool {
        matches!(self, CacheState::Ready)
    }
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was running; it will take one more pass for this
    /// trigger.
    Coalesced,
    /// No environment is tracked yet.
    NoEnvironments,
    /// The change log has not advanced.
    UpToDate,
    /// The recorded revision id advanced.
    Advanced {
        /// New recorded global revision id.
        revision_id: u64,
        /// Number of distinct feature names changed.
        changed: usize,
    },
}

impl RefreshOutcome {
    /// Combines the outcome so far with that of a later pass. A trailing
    /// pass that found nothing new does not hide an earlier advance.
    fn absorb(self, pass: RefreshOutcome) -> RefreshOutcome {
        match (self, pass) {
            (RefreshOutcome::Advanced { .. }, RefreshOutcome::UpToDate) => self,
            _ => pass,
        }
    }

    fn is_advanced(&self) -> bool {
        matches!(self, RefreshOutcome::Advanced { .. })
    }
}

/// A log built by a refresh pass, waiting to be published.
struct StagedLog {
    environment: String,
    based_on: Arc<RevisionLog>,
    log: Arc<RevisionLog>,
}

/// Marks a refresh as running; cleared on drop.
struct RefreshSlot<'a>(&'a AtomicBool);

impl<'a> RefreshSlot<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshSlot(flag))
    }
}

impl Drop for RefreshSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Incremental feature-configuration cache.
///
/// Owns one [`RevisionLog`] per environment and answers client polls with
/// the net changes since the client's last revision.
pub struct DeltaCache<S, N> {
    config: CacheConfig,
    store: S,
    notifier: N,
    logs: ArcSwap<LogMap>,
    segments: ArcSwapOption<Vec<ClientSegment>>,
    publish: parking_lot::Mutex<()>,
    populating: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    refreshing: AtomicBool,
    refresh_requested: AtomicBool,
    recorded_revision_id: AtomicU64,
    state: RwLock<CacheState>,
}

impl<S: FeatureStore, N: ChangeNotifier> DeltaCache<S, N> {
    /// Creates an empty cache. Nothing is fetched until [`start`](Self::start)
    /// or the first request.
    pub fn new(config: CacheConfig, store: S, notifier: N) -> Self {
        Self {
            config,
            store,
            notifier,
            logs: ArcSwap::from_pointee(HashMap::new()),
            segments: ArcSwapOption::empty(),
            publish: parking_lot::Mutex::new(()),
            populating: parking_lot::Mutex::new(HashMap::new()),
            refreshing: AtomicBool::new(false),
            refresh_requested: AtomicBool::new(false),
            recorded_revision_id: AtomicU64::new(0),
            state: RwLock::new(CacheState::Uninitialized),
        }
    }

    /// Cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CacheState {
        *self.state.read()
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The change notifier.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Global revision id every tracked log has caught up to.
    pub fn recorded_revision_id(&self) -> u64 {
        self.recorded_revision_id.load(Ordering::Acquire)
    }

    /// Tracked environments, sorted.
    pub fn environments(&self) -> Vec<String> {
        let mut environments: Vec<String> = self.logs.load().keys().cloned().collect();
        environments.sort();
        environments
    }

    /// The current log of an environment.
    pub fn log(&self, environment: &str) -> CacheResult<Arc<RevisionLog>> {
        self.logs
            .load()
            .get(environment)
            .cloned()
            .ok_or_else(|| CacheError::UnknownEnvironment(environment.to_string()))
    }

    /// Head revision id of an environment's log.
    pub fn head_revision_id(&self, environment: &str) -> CacheResult<u64> {
        self.log(environment).map(|log| log.head_revision_id())
    }

    /// Populates the configured environments, then spawns the refresh task.
    ///
    /// Population failures are logged and left to lazy population on the
    /// first request for that environment.
    pub async fn start(self: &Arc<Self>) -> RefreshTask
    where
        S: 'static,
        N: 'static,
    {
        // Subscribe first so a change racing population still wakes the task.
        let mut signals = self.notifier.subscribe();

        for environment in &self.config.environments {
            if let Err(error) = self.populate_environment(environment).await {
                warn!(%environment, %error, "initial population failed");
            }
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(
                environments = cache.environments().len(),
                revision_id = cache.recorded_revision_id(),
                "refresh task started"
            );
            loop {
                tokio::select! {
                    changed = signals.changed() => {
                        if changed.is_err() {
                            debug!("change notifier closed");
                            break;
                        }
                        let signalled = *signals.borrow_and_update();
                        trace!(signalled, "change signal received");
                        // Failures are logged by refresh and retried on the next signal.
                        let _ = cache.refresh().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("refresh task stopped");
        });

        RefreshTask {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// Installs a base snapshot for `environment` if it has no log yet.
    ///
    /// The global revision id is read before the snapshot is fetched: a
    /// change racing the fetch is then picked up again by the next refresh
    /// instead of being skipped. If another caller installed a log first,
    /// that log is returned untouched.
    pub async fn populate_environment(&self, environment: &str) -> CacheResult<Arc<RevisionLog>> {
        let existing = self.logs.load().get(environment).cloned();
        if let Some(log) = existing {
            return Ok(log);
        }

        let slot = Arc::clone(
            self.populating
                .lock()
                .entry(environment.to_string())
                .or_default(),
        );
        let populating = slot.lock().await;
        let existing = self.logs.load().get(environment).cloned();
        if let Some(log) = existing {
            return Ok(log);
        }

        {
            let mut state = self.state.write();
            if *state == CacheState::Uninitialized {
                *state = CacheState::PopulatingBase;
            }
        }

        let fetched = self.fetch_base(environment).await;
        let (revision_id, features) = match fetched {
            Ok(fetched) => fetched,
            Err(error) => {
                let mut state = self.state.write();
                if *state == CacheState::PopulatingBase && self.logs.load().is_empty() {
                    *state = CacheState::Uninitialized;
                }
                warn!(%environment, %error, "population failed");
                return Err(error);
            }
        };

        let feature_count = features.len();
        let log = Arc::new(RevisionLog::new(
            Revision::snapshot(revision_id, features),
            self.config.capacity,
        ));
        let behind = self.install(environment, Arc::clone(&log));
        *self.state.write() = CacheState::Ready;
        drop(populating);

        info!(%environment, revision_id, features = feature_count, "populated environment");
        self.log_footprint();

        if behind {
            debug!(%environment, revision_id, "log installed behind baseline; catching up");
            if let Err(error) = self.refresh().await {
                warn!(%environment, %error, "catch-up refresh failed");
            }
        }
        Ok(log)
    }

    /// Publishes a freshly populated log. Returns true if the log starts
    /// behind the recorded revision id and needs a catch-up refresh.
    fn install(&self, environment: &str, log: Arc<RevisionLog>) -> bool {
        let _publish = self.publish.lock();
        let current = self.logs.load_full();
        let head = log.head_revision_id();
        let mut next = LogMap::clone(&current);
        next.insert(environment.to_string(), log);
        self.logs.store(Arc::new(next));

        // The first log sets the refresh baseline.
        if current.is_empty() {
            self.recorded_revision_id.store(head, Ordering::Release);
            return false;
        }
        if head < self.recorded_revision_id() {
            self.recorded_revision_id.store(head, Ordering::Release);
            return true;
        }
        false
    }

    async fn fetch_base(&self, environment: &str) -> CacheResult<(u64, Vec<FeatureDefinition>)> {
        let timeout = self.config.fetch_timeout;
        let revision_id =
            with_timeout(timeout, "revision lookup", self.notifier.current_revision_id()).await?;
        let features =
            with_timeout(timeout, "snapshot fetch", self.store.fetch_snapshot(environment)).await?;
        Ok((revision_id, features))
    }

    /// Pulls changes since the recorded revision id into every tracked log.
    ///
    /// Each pass builds every environment's revision first, publishes the
    /// new logs in one swap and only then advances the recorded id. On
    /// failure nothing is published and the next call retries from the same
    /// baseline. Segments are reloaded once the logs have advanced.
    pub async fn refresh(&self) -> CacheResult<RefreshOutcome> {
        self.refresh_requested.store(true, Ordering::Release);
        let mut outcome = RefreshOutcome::Coalesced;

        loop {
            let Some(running) = RefreshSlot::acquire(&self.refreshing) else {
                trace!("refresh already running; trigger handed over");
                return Ok(outcome);
            };

            while self.refresh_requested.swap(false, Ordering::AcqRel) {
                match self.refresh_pass().await {
                    Ok(pass) => {
                        debug!(outcome = ?pass, "refresh pass finished");
                        outcome = outcome.absorb(pass);
                    }
                    Err(error) => {
                        warn!(
                            %error,
                            revision_id = self.recorded_revision_id(),
                            "refresh abandoned"
                        );
                        return Err(error);
                    }
                }
            }

            if outcome.is_advanced() {
                self.reload_segments().await;
            }
            drop(running);

            // A trigger that landed after the last pass but before the slot
            // was released is ours to run.
            if !self.refresh_requested.load(Ordering::Acquire) {
                return Ok(outcome);
            }
        }
    }

    async fn refresh_pass(&self) -> CacheResult<RefreshOutcome> {
        let tracked = self.logs.load_full();
        if tracked.is_empty() {
            return Ok(RefreshOutcome::NoEnvironments);
        }

        let previous = self.recorded_revision_id();
        let changes = with_timeout(
            self.config.fetch_timeout,
            "change lookup",
            self.notifier.changed_names_since(previous),
        )
        .await?;
        if changes.latest_id <= previous {
            return Ok(RefreshOutcome::UpToDate);
        }

        let staged = if changes.is_empty() {
            Vec::new()
        } else {
            let behind = tracked.iter().filter(|(environment, log)| {
                let current = log.head_revision_id() >= changes.latest_id;
                if current {
                    trace!(
                        %environment,
                        head = log.head_revision_id(),
                        "environment already current"
                    );
                }
                !current
            });
            try_join_all(behind.map(|(environment, log)| self.stage(environment, log, &changes)))
                .await?
        };

        let revision_id = self.publish_refresh(&tracked, staged, changes.latest_id);
        self.log_footprint();

        Ok(RefreshOutcome::Advanced {
            revision_id,
            changed: changes.names.len(),
        })
    }

    async fn stage(
        &self,
        environment: &str,
        log: &Arc<RevisionLog>,
        changes: &ChangeSet,
    ) -> CacheResult<StagedLog> {
        let features = with_timeout(
            self.config.fetch_timeout,
            "changed feature fetch",
            self.store.fetch_by_names(&changes.names, environment),
        )
        .await?;
        let revision = build_revision(log, changes.latest_id, &changes.names, features);
        trace!(
            %environment,
            updated = revision.updated.len(),
            removed = revision.removed.len(),
            "staged revision"
        );

        let mut next = RevisionLog::clone(log);
        next.append(revision)?;
        Ok(StagedLog {
            environment: environment.to_string(),
            based_on: Arc::clone(log),
            log: Arc::new(next),
        })
    }

    /// Swaps staged logs in and records the new baseline. Returns the
    /// recorded revision id.
    ///
    /// A staged log whose environment was reset or repopulated meanwhile is
    /// dropped. A log installed during the pass was not covered by it: if it
    /// is behind `latest_id`, the baseline stays at its head and another
    /// pass is requested.
    fn publish_refresh(&self, tracked: &LogMap, staged: Vec<StagedLog>, latest_id: u64) -> u64 {
        let _publish = self.publish.lock();
        let current = self.logs.load_full();
        let mut next = LogMap::clone(&current);
        for staged in staged {
            let unchanged = current
                .get(&staged.environment)
                .is_some_and(|log| Arc::ptr_eq(log, &staged.based_on));
            if unchanged {
                next.insert(staged.environment, staged.log);
            } else {
                trace!(environment = %staged.environment, "dropping stale staged log");
            }
        }

        let mut recorded = latest_id;
        for (environment, log) in current.iter() {
            let covered = tracked
                .get(environment)
                .is_some_and(|seen| Arc::ptr_eq(seen, log));
            if !covered && log.head_revision_id() < latest_id {
                debug!(
                    %environment,
                    head = log.head_revision_id(),
                    "environment joined mid-refresh"
                );
                recorded = recorded.min(log.head_revision_id());
            }
        }

        self.logs.store(Arc::new(next));
        self.recorded_revision_id.store(recorded, Ordering::Release);
        if recorded < latest_id {
            self.refresh_requested.store(true, Ordering::Release);
        }
        recorded
    }

    /// Resolves a client poll.
    ///
    /// An environment without a log is populated first; that fetch failing
    /// is the only error a warm cache path can return when the snapshot
    /// fallback is enabled.
    pub async fn resolve_delta(
        &self,
        client_revision: Option<u64>,
        query: &DeltaQuery,
    ) -> CacheResult<ClientFeatureChange> {
        let environment = query.environment.as_str();
        let existing = self.logs.load().get(environment).cloned();
        let log = match existing {
            Some(log) => log,
            None => self.populate_environment(environment).await?,
        };

        match resolve(&log, client_revision, &query.filter) {
            Resolution::Unchanged => Ok(ClientFeatureChange::Unchanged),
            Resolution::Delta(delta) => Ok(ClientFeatureChange::Delta(delta)),
            Resolution::SnapshotRequired { head } => self
                .snapshot(environment, &log, head, &query.filter)
                .await
                .map(ClientFeatureChange::FullSnapshot),
        }
    }

    async fn snapshot(
        &self,
        environment: &str,
        log: &RevisionLog,
        head: u64,
        filter: &FeatureFilter,
    ) -> CacheResult<CompactedDelta> {
        let fetched = with_timeout(
            self.config.fetch_timeout,
            "snapshot fetch",
            self.store.fetch_snapshot(environment),
        )
        .await;

        match fetched {
            Ok(features) => Ok(Revision::snapshot(head, features).filtered(filter)),
            Err(error) if self.config.snapshot_fallback => {
                warn!(%environment, %error, head, "snapshot fetch failed; serving log state");
                Ok(materialize(log, filter))
            }
            Err(error) => Err(error),
        }
    }

    /// The active client segments sent with every hydration.
    ///
    /// Loaded on first use and reloaded after every refresh that advances.
    /// A failed first load is returned to the caller.
    pub async fn segments(&self) -> CacheResult<Arc<Vec<ClientSegment>>> {
        if let Some(segments) = self.segments.load_full() {
            return Ok(segments);
        }
        let segments = Arc::new(
            with_timeout(
                self.config.fetch_timeout,
                "segment fetch",
                self.store.fetch_segments(),
            )
            .await?,
        );
        self.segments.store(Some(Arc::clone(&segments)));
        debug!(segments = segments.len(), "loaded client segments");
        Ok(segments)
    }

    async fn reload_segments(&self) {
        let fetched = with_timeout(
            self.config.fetch_timeout,
            "segment fetch",
            self.store.fetch_segments(),
        )
        .await;
        match fetched {
            Ok(segments) => {
                trace!(segments = segments.len(), "reloaded client segments");
                self.segments.store(Some(Arc::new(segments)));
            }
            Err(error) => warn!(%error, "segment reload failed; keeping previous segments"),
        }
    }

    /// Drops every log. The next request per environment repopulates it.
    pub async fn reset(&self) {
        {
            let _publish = self.publish.lock();
            self.logs.store(Arc::new(HashMap::new()));
            *self.state.write() = CacheState::Uninitialized;
        }
        info!("delta cache reset");
    }

    /// Approximate memory held by the logs and segments: their serialized
    /// JSON size.
    pub fn footprint_bytes(&self) -> usize {
        let logs: usize = self
            .logs
            .load()
            .values()
            .flat_map(|log| log.snapshot().iter())
            .map(|revision| json_size::<Revision>(revision))
            .sum();
        let segments = self
            .segments
            .load()
            .as_deref()
            .map_or(0, |segments| json_size(segments));
        logs + segments
    }

    fn log_footprint(&self) {
        debug!(bytes = self.footprint_bytes(), "delta cache footprint");
    }
}

fn json_size<T: serde::Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Builds the revision an environment receives for a change set.
///
/// Names the store no longer returns become tombstones carrying the last
/// project the log saw them in. A name the log never saw was never visible
/// to this environment's clients and is skipped.
fn build_revision(
    log: &RevisionLog,
    revision_id: u64,
    names: &[String],
    features: Vec<FeatureDefinition>,
) -> Revision {
    let mut revision = Revision::new(revision_id);
    for feature in features {
        revision.update(feature);
    }
    for name in names {
        if revision.updated.contains_key(name) {
            continue;
        }
        match log.last_known_project(name) {
            Some(project) => revision.remove(DeletedFeature::new(name.clone(), project)),
            None => trace!(name = %name, "skipping removal of unknown feature"),
        }
    }
    revision
}

async fn with_timeout<T, E>(
    timeout: Duration,
    operation: &'static str,
    future: impl Future<Output = Result<T, E>>,
) -> CacheResult<T>
where
    CacheError: From<E>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(CacheError::from),
        Err(_) => Err(CacheError::Timeout(operation)),
    }
}

/// Handle to the background refresh task.
pub struct RefreshTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Signals the task to stop and waits for it to finish.
    pub async fn stop(self) -> CacheResult<()> {
        // The task may already have exited on its own.
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|error| CacheError::Task(error.to_string()))
    }

    /// Returns true if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NotifierError, StoreError};
    use crate::memory::{MemoryChangeLog, MemoryFeatureStore};
    use crate::notifier::ChangeSet;
    use flagdelta_testkit::prelude::*;

    type TestCache = DeltaCache<MemoryFeatureStore, MemoryChangeLog>;

    fn cache(capacity: usize) -> (TestCache, MemoryFeatureStore, MemoryChangeLog) {
        let store = MemoryFeatureStore::new();
        let changes = MemoryChangeLog::new();
        let config = CacheConfig::new(capacity).with_environments(["default"]);
        (
            DeltaCache::new(config, store.clone(), changes.clone()),
            store,
            changes,
        )
    }

    fn query() -> DeltaQuery {
        DeltaQuery::default()
    }

    #[tokio::test]
    async fn lazy_population_on_first_request() {
        let (cache, store, changes) = cache(10);
        store.upsert("default", feature("a", "web"));
        changes.record("a");
        assert_eq!(cache.state(), CacheState::Uninitialized);

        let change = cache.resolve_delta(None, &query()).await.unwrap();
        assert!(change.is_full_snapshot());
        assert_eq!(change.revision_id(), Some(1));
        assert_eq!(cache.state(), CacheState::Ready);
        assert_eq!(cache.environments(), vec!["default"]);
        assert_eq!(cache.recorded_revision_id(), 1);
    }

    #[tokio::test]
    async fn population_failure_surfaces_and_retries() {
        let (cache, store, _changes) = cache(10);
        store.set_failure(Some(StoreError::Unavailable("down".into())));

        let err = cache.resolve_delta(None, &query()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(cache.state(), CacheState::Uninitialized);
        assert!(cache.environments().is_empty());

        store.set_failure(None);
        assert!(cache.resolve_delta(None, &query()).await.is_ok());
        assert_eq!(cache.state(), CacheState::Ready);
    }

    #[tokio::test]
    async fn refresh_appends_updates_and_removals() {
        let (cache, store, changes) = cache(10);
        store.upsert("default", feature("a", "web"));
        store.upsert("default", feature("b", "web"));
        changes.record_all(["a", "b"]);
        cache.populate_environment("default").await.unwrap();

        store.upsert("default", disabled_feature("a", "web"));
        store.remove("default", "b");
        changes.record_all(["a", "b"]);

        let outcome = cache.refresh().await.unwrap();
        assert_eq!(
            outcome,
            RefreshOutcome::Advanced {
                revision_id: 4,
                changed: 2
            }
        );

        let change = cache.resolve_delta(Some(2), &query()).await.unwrap();
        let delta = change.body().unwrap();
        assert_eq!(delta.revision_id, 4);
        assert_eq!(updated_names(delta), vec!["a"]);
        assert!(!delta.updated["a"].enabled);
        assert_eq!(removed_names(delta), vec!["b"]);
        assert_eq!(delta.removed["b"].project, "web");
    }

    #[tokio::test]
    async fn unknown_removal_is_skipped() {
        let (cache, _store, changes) = cache(10);
        cache.populate_environment("default").await.unwrap();

        changes.record("never-existed");
        cache.refresh().await.unwrap();

        let log = cache.log("default").unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.head().is_empty());
    }

    #[tokio::test]
    async fn refresh_without_environments() {
        let (cache, _store, changes) = cache(10);
        changes.record("a");
        assert_eq!(cache.refresh().await.unwrap(), RefreshOutcome::NoEnvironments);
    }

    #[tokio::test]
    async fn redundant_signal_is_up_to_date() {
        let (cache, _store, changes) = cache(10);
        changes.record("a");
        cache.populate_environment("default").await.unwrap();

        assert_eq!(cache.refresh().await.unwrap(), RefreshOutcome::UpToDate);
        assert_eq!(cache.head_revision_id("default").unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_baseline() {
        let (cache, store, changes) = cache(10);
        store.upsert("default", feature("a", "web"));
        changes.record("a");
        cache.populate_environment("default").await.unwrap();

        store.upsert("default", disabled_feature("a", "web"));
        changes.record("a");
        store.set_failure(Some(StoreError::Query("syntax".into())));
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.recorded_revision_id(), 1);
        assert_eq!(cache.head_revision_id("default").unwrap(), 1);

        store.set_failure(None);
        assert!(matches!(
            cache.refresh().await.unwrap(),
            RefreshOutcome::Advanced { revision_id: 2, .. }
        ));
        assert_eq!(cache.head_revision_id("default").unwrap(), 2);
    }

    #[tokio::test]
    async fn notifier_failure_abandons_refresh() {
        let (cache, _store, changes) = cache(10);
        cache.populate_environment("default").await.unwrap();
        changes.record("a");
        changes.set_failure(Some(NotifierError::Unavailable("offline".into())));

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, CacheError::Notifier(_)));
        assert_eq!(cache.recorded_revision_id(), 0);
    }

    #[tokio::test]
    async fn snapshot_fallback_serves_log_state() {
        let (cache, store, changes) = cache(10);
        store.upsert("default", feature("a", "web"));
        changes.record("a");
        cache.populate_environment("default").await.unwrap();

        store.set_failure(Some(StoreError::Unavailable("down".into())));
        let change = cache.resolve_delta(None, &query()).await.unwrap();
        let snapshot = change.body().unwrap();
        assert!(change.is_full_snapshot());
        assert_eq!(snapshot.revision_id, 1);
        assert_eq!(updated_names(snapshot), vec!["a"]);
    }

    #[tokio::test]
    async fn snapshot_failure_without_fallback() {
        let store = MemoryFeatureStore::new();
        let changes = MemoryChangeLog::new();
        let config = CacheConfig::default().with_snapshot_fallback(false);
        let cache = DeltaCache::new(config, store.clone(), changes);
        cache.populate_environment("default").await.unwrap();

        store.set_failure(Some(StoreError::Unavailable("down".into())));
        assert!(cache.resolve_delta(None, &query()).await.is_err());
    }

    #[tokio::test]
    async fn fetch_timeout() {
        let store = MemoryFeatureStore::new();
        store.set_latency(Some(Duration::from_millis(200)));
        let config = CacheConfig::default().with_fetch_timeout(Duration::from_millis(10));
        let cache = DeltaCache::new(config, store, MemoryChangeLog::new());

        let err = cache.resolve_delta(None, &query()).await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout("snapshot fetch")));
    }

    /// Reports a fixed change set regardless of the requested id.
    struct FixedNotifier {
        changes: ChangeSet,
        signal: watch::Sender<u64>,
    }

    impl FixedNotifier {
        fn new(latest_id: u64, names: &[&str]) -> Self {
            let names = names.iter().map(|n| n.to_string()).collect();
            Self {
                changes: ChangeSet::new(latest_id, names),
                signal: watch::channel(latest_id).0,
            }
        }
    }

    #[async_trait::async_trait]
    impl ChangeNotifier for FixedNotifier {
        async fn current_revision_id(&self) -> crate::error::NotifierResult<u64> {
            Ok(0)
        }

        async fn changed_names_since(
            &self,
            _previous_id: u64,
        ) -> crate::error::NotifierResult<ChangeSet> {
            Ok(self.changes.clone())
        }

        fn subscribe(&self) -> watch::Receiver<u64> {
            self.signal.subscribe()
        }
    }

    #[tokio::test]
    async fn empty_change_set_advances_without_appending() {
        let cache = DeltaCache::new(
            CacheConfig::default(),
            MemoryFeatureStore::new(),
            FixedNotifier::new(5, &[]),
        );
        cache.populate_environment("default").await.unwrap();

        assert_eq!(
            cache.refresh().await.unwrap(),
            RefreshOutcome::Advanced {
                revision_id: 5,
                changed: 0
            }
        );
        assert_eq!(cache.recorded_revision_id(), 5);
        assert_eq!(cache.log("default").unwrap().len(), 1);
        assert_eq!(cache.refresh().await.unwrap(), RefreshOutcome::UpToDate);
    }

    #[tokio::test]
    async fn concurrent_refresh_is_coalesced() {
        let store = MemoryFeatureStore::new();
        let cache = Arc::new(DeltaCache::new(
            CacheConfig::default(),
            store.clone(),
            FixedNotifier::new(3, &["a"]),
        ));
        cache.populate_environment("default").await.unwrap();

        store.set_latency(Some(Duration::from_millis(100)));
        let running = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.refresh().await.unwrap(), RefreshOutcome::Coalesced);
        assert!(matches!(
            running.await.unwrap().unwrap(),
            RefreshOutcome::Advanced { revision_id: 3, .. }
        ));
    }

    #[tokio::test]
    async fn environment_populated_after_change_is_skipped() {
        let (cache, store, changes) = cache(10);
        cache.populate_environment("default").await.unwrap();

        store.upsert("default", feature("a", "web"));
        store.upsert("production", feature("a", "web"));
        changes.record("a");
        cache.populate_environment("production").await.unwrap();
        assert_eq!(cache.head_revision_id("production").unwrap(), 1);

        cache.refresh().await.unwrap();
        assert_eq!(cache.head_revision_id("default").unwrap(), 1);
        assert_eq!(cache.log("production").unwrap().len(), 1);
        assert_eq!(cache.log("default").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reset_drops_logs() {
        let (cache, _store, _changes) = cache(10);
        cache.populate_environment("default").await.unwrap();
        assert!(cache.footprint_bytes() > 0);

        cache.reset().await;
        assert!(cache.environments().is_empty());
        assert_eq!(cache.footprint_bytes(), 0);
        assert_eq!(cache.state(), CacheState::Uninitialized);
        assert!(matches!(
            cache.log("default"),
            Err(CacheError::UnknownEnvironment(_))
        ));
    }

    #[test]
    fn build_revision_marks_missing_names_removed() {
        let mut base = Revision::new(1);
        base.update(feature("a", "web"));
        base.update(feature("b", "mobile"));
        let log = RevisionLog::new(base, 4);

        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let revision = build_revision(&log, 2, &names, vec![disabled_feature("a", "web")]);
        assert_eq!(updated_names(&revision), vec!["a"]);
        assert_eq!(removed_names(&revision), vec!["b"]);
        assert_eq!(revision.removed["b"].project, "mobile");
    }

    #[tokio::test]
    async fn trigger_during_refresh_gets_its_own_pass() {
        let store = MemoryFeatureStore::new();
        let changes = MemoryChangeLog::new();
        let cache = Arc::new(DeltaCache::new(
            CacheConfig::default(),
            store.clone(),
            changes.clone(),
        ));
        cache.populate_environment("default").await.unwrap();

        store.upsert("default", feature("a", "web"));
        changes.record("a");
        store.set_latency(Some(Duration::from_millis(100)));
        let running = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Recorded after the running pass read the change log.
        store.upsert("default", feature("b", "web"));
        changes.record("b");
        assert_eq!(cache.refresh().await.unwrap(), RefreshOutcome::Coalesced);

        assert_eq!(
            running.await.unwrap().unwrap(),
            RefreshOutcome::Advanced {
                revision_id: 2,
                changed: 1
            }
        );
        let log = cache.log("default").unwrap();
        assert_eq!(log.head_revision_id(), 2);
        assert_eq!(log.len(), 3);
        assert!(log.head().updated.contains_key("b"));
    }

    #[tokio::test]
    async fn log_installed_behind_baseline_catches_up() {
        let (cache, store, changes) = cache(10);
        cache.populate_environment("default").await.unwrap();
        store.upsert("default", feature("a", "web"));
        store.upsert("production", feature("b", "web"));
        changes.record_all(["a", "b"]);
        cache.refresh().await.unwrap();
        assert_eq!(cache.recorded_revision_id(), 2);

        // A snapshot taken at revision 1 finishing after the refresh.
        let stale = RevisionLog::new(Revision::snapshot(1, Vec::new()), 10);
        assert!(cache.install("production", Arc::new(stale)));
        assert_eq!(cache.recorded_revision_id(), 1);

        cache.refresh().await.unwrap();
        assert_eq!(cache.recorded_revision_id(), 2);
        assert_eq!(cache.head_revision_id("default").unwrap(), 2);
        let production = cache.log("production").unwrap();
        assert_eq!(production.head_revision_id(), 2);
        assert!(production.head().updated.contains_key("b"));
    }

    #[tokio::test]
    async fn segments_load_once_and_reload_on_advance() {
        let (cache, store, changes) = cache(10);
        store.set_segments(vec![ClientSegment::new(1, "beta")]);
        cache.populate_environment("default").await.unwrap();

        assert_eq!(cache.segments().await.unwrap().len(), 1);
        assert_eq!(cache.segments().await.unwrap().len(), 1);
        assert_eq!(store.segment_calls(), 1);

        store.set_segments(Vec::new());
        assert_eq!(cache.refresh().await.unwrap(), RefreshOutcome::UpToDate);
        assert_eq!(store.segment_calls(), 1);

        changes.record("a");
        cache.refresh().await.unwrap();
        assert!(cache.segments().await.unwrap().is_empty());
        assert_eq!(store.segment_calls(), 2);
    }

    #[tokio::test]
    async fn failed_segment_reload_keeps_previous() {
        let store = MemoryFeatureStore::new();
        store.set_segments(vec![ClientSegment::new(1, "beta")]);
        let cache = DeltaCache::new(
            CacheConfig::default(),
            store.clone(),
            FixedNotifier::new(5, &[]),
        );
        cache.populate_environment("default").await.unwrap();
        cache.segments().await.unwrap();

        // No names changed, so the segment reload is the only store call.
        store.set_failure(Some(StoreError::Unavailable("down".into())));
        assert!(matches!(
            cache.refresh().await.unwrap(),
            RefreshOutcome::Advanced { revision_id: 5, .. }
        ));
        assert_eq!(store.segment_calls(), 2);

        store.set_failure(None);
        assert_eq!(cache.segments().await.unwrap()[0].name, "beta");
        assert_eq!(store.segment_calls(), 2);
    }
}
