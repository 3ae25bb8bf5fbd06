//! Replay command implementation.
//!
//! A scenario seeds an in-memory store, then runs a list of steps: feature
//! edits (each recorded in the change log), explicit refreshes and client
//! polls. Each client remembers the last validator it received and presents
//! it on its next poll, the way an SDK does.

use flagdelta_protocol::{
    ClientSegment, DeltaEvent, DeltaQuery, FeatureDefinition, ALL_PROJECTS, DEFAULT_ENVIRONMENT,
};
use flagdelta_server::{
    CacheConfig, CacheError, DeltaCache, DeltaHandler, DeltaResponse, MemoryChangeLog,
    MemoryFeatureStore, RefreshOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading or replaying a scenario.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The scenario file could not be read.
    #[error("cannot read scenario: {0}")]
    Io(#[from] std::io::Error),

    /// The scenario is not valid JSON or has the wrong shape.
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    /// The cache failed a step.
    #[error("step {step}: {source}")]
    Step {
        /// 1-based step number.
        step: usize,
        /// Underlying cache error.
        source: CacheError,
    },

    /// The cache failed while populating.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Environments populated before the first step.
    #[serde(default = "default_environments")]
    pub environments: Vec<String>,
    /// Revision log capacity.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Features present before the first step. They are not recorded in the
    /// change log.
    #[serde(default)]
    pub features: Vec<FeatureWrite>,
    /// Segments served with every hydration.
    #[serde(default)]
    pub segments: Vec<ClientSegment>,
    /// Steps in order.
    pub steps: Vec<Step>,
}

fn default_environments() -> Vec<String> {
    vec![DEFAULT_ENVIRONMENT.to_string()]
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

/// A feature definition bound to an environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureWrite {
    /// Target environment.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// The definition.
    pub feature: FeatureDefinition,
}

/// Removal of a feature from an environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    /// Target environment.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Feature name.
    pub name: String,
}

/// A client poll.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    /// Client identity; validators are remembered per client.
    pub client: String,
    /// Environment polled.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Projects the client is scoped to.
    #[serde(default)]
    pub projects: Option<Vec<String>>,
    /// Optional feature name prefix.
    #[serde(default)]
    pub name_prefix: Option<String>,
}

impl Poll {
    fn query(&self) -> DeltaQuery {
        let projects = self
            .projects
            .clone()
            .unwrap_or_else(|| vec![ALL_PROJECTS.to_string()]);
        let query = DeltaQuery::new(self.environment.clone()).with_projects(projects);
        match &self.name_prefix {
            Some(prefix) => query.with_name_prefix(prefix.clone()),
            None => query,
        }
    }
}

/// Marker for a step without arguments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoArgs {}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Add or change a feature and record the change.
    Upsert(FeatureWrite),
    /// Remove a feature and record the change.
    Archive(Archive),
    /// Pull recorded changes into the cache.
    Refresh(NoArgs),
    /// Poll as a client.
    Poll(Poll),
}

/// What one step did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum StepReport {
    /// A feature was written.
    #[serde(rename_all = "camelCase")]
    Upsert {
        /// Environment written.
        environment: String,
        /// Feature name.
        name: String,
        /// Global revision id recorded for the change.
        revision_id: u64,
    },
    /// A feature was removed.
    #[serde(rename_all = "camelCase")]
    Archive {
        /// Environment written.
        environment: String,
        /// Feature name.
        name: String,
        /// Global revision id recorded for the change.
        revision_id: u64,
    },
    /// The cache refreshed.
    Refresh {
        /// Human-readable outcome.
        outcome: String,
    },
    /// A client polled.
    Poll {
        /// Client identity.
        client: String,
        /// Environment polled.
        environment: String,
        /// 200 or 304.
        status: u16,
        /// Validator returned.
        etag: String,
        /// Events returned.
        events: Vec<DeltaEvent>,
    },
}

/// Per-environment log summary after the replay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSummary {
    /// Environment name.
    pub environment: String,
    /// Oldest retained revision id.
    pub base_revision_id: u64,
    /// Newest revision id.
    pub head_revision_id: u64,
    /// Retained revisions.
    pub revisions: usize,
}

/// Full replay result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// One entry per step.
    pub steps: Vec<StepReport>,
    /// Log summaries, sorted by environment.
    pub environments: Vec<EnvironmentSummary>,
    /// Serialized size of all logs.
    pub footprint_bytes: usize,
}

/// Runs the replay command.
pub fn run(
    path: &Path,
    capacity: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = load_scenario(path)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(replay(scenario, capacity))?;

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Reads and parses a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ReplayError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Replays a scenario against a fresh cache.
pub async fn replay(
    scenario: Scenario,
    capacity: Option<usize>,
) -> Result<ReplayReport, ReplayError> {
    let store = MemoryFeatureStore::new();
    let changes = MemoryChangeLog::new();
    for write in scenario.features {
        store.upsert(&write.environment, write.feature);
    }
    store.set_segments(scenario.segments);

    let capacity = capacity.or(scenario.capacity).unwrap_or(100);
    let config = CacheConfig::new(capacity).with_environments(scenario.environments);
    let cache = Arc::new(DeltaCache::new(config, store.clone(), changes.clone()));
    for environment in &cache.config().environments {
        cache.populate_environment(environment).await?;
    }
    info!(
        capacity = cache.config().capacity,
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let handler = DeltaHandler::new(Arc::clone(&cache));
    let mut validators: HashMap<String, String> = HashMap::new();
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.into_iter().enumerate() {
        let number = index + 1;
        let report = match step {
            Step::Upsert(write) => {
                let name = write.feature.name.clone();
                store.upsert(&write.environment, write.feature);
                let revision_id = changes.record(name.clone());
                StepReport::Upsert {
                    environment: write.environment,
                    name,
                    revision_id,
                }
            }
            Step::Archive(archive) => {
                if store.remove(&archive.environment, &archive.name).is_none() {
                    debug!(name = %archive.name, "archiving a feature the store does not hold");
                }
                let revision_id = changes.record(archive.name.clone());
                StepReport::Archive {
                    environment: archive.environment,
                    name: archive.name,
                    revision_id,
                }
            }
            Step::Refresh(_) => {
                let outcome = cache
                    .refresh()
                    .await
                    .map_err(|source| ReplayError::Step {
                        step: number,
                        source,
                    })?;
                StepReport::Refresh {
                    outcome: describe(outcome),
                }
            }
            Step::Poll(poll) => {
                let query = poll.query();
                let validator = validators.get(&poll.client).cloned();
                let response = handler
                    .handle(validator.as_deref(), &query)
                    .await
                    .map_err(|source| ReplayError::Step {
                        step: number,
                        source,
                    })?;
                validators.insert(poll.client.clone(), response.etag().to_string());

                let (status, etag, events) = match response {
                    DeltaResponse::NotModified { etag } => (304, etag, Vec::new()),
                    DeltaResponse::Ok { etag, body } => (200, etag, body.events),
                };
                StepReport::Poll {
                    client: poll.client,
                    environment: poll.environment,
                    status,
                    etag,
                    events,
                }
            }
        };
        reports.push(report);
    }

    let mut environments = Vec::new();
    for environment in cache.environments() {
        let log = cache.log(&environment)?;
        environments.push(EnvironmentSummary {
            environment,
            base_revision_id: log.base_revision_id(),
            head_revision_id: log.head_revision_id(),
            revisions: log.len(),
        });
    }

    Ok(ReplayReport {
        steps: reports,
        environments,
        footprint_bytes: cache.footprint_bytes(),
    })
}

fn describe(outcome: RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Coalesced => "coalesced".to_string(),
        RefreshOutcome::NoEnvironments => "no environments".to_string(),
        RefreshOutcome::UpToDate => "up to date".to_string(),
        RefreshOutcome::Advanced {
            revision_id,
            changed,
        } => format!("advanced to {revision_id} ({changed} changed)"),
    }
}

fn describe_event(event: &DeltaEvent) -> String {
    match event {
        DeltaEvent::Hydration {
            features, segments, ..
        } if !segments.is_empty() => format!(
            "hydration ({} features, {} segments)",
            features.len(),
            segments.len()
        ),
        DeltaEvent::Hydration { features, .. } => {
            format!("hydration ({} features)", features.len())
        }
        DeltaEvent::FeatureUpdated { feature, .. } => format!("+{}", feature.name),
        DeltaEvent::FeatureRemoved { feature_name, .. } => format!("-{feature_name}"),
    }
}

fn print_text_output(report: &ReplayReport) {
    for (index, step) in report.steps.iter().enumerate() {
        let number = index + 1;
        match step {
            StepReport::Upsert {
                environment,
                name,
                revision_id,
            } => println!("[{number}] upsert {name} @{environment} -> revision {revision_id}"),
            StepReport::Archive {
                environment,
                name,
                revision_id,
            } => println!("[{number}] archive {name} @{environment} -> revision {revision_id}"),
            StepReport::Refresh { outcome } => println!("[{number}] refresh: {outcome}"),
            StepReport::Poll {
                client,
                environment,
                status,
                etag,
                events,
            } => {
                let events: Vec<String> = events.iter().map(describe_event).collect();
                println!(
                    "[{number}] poll {client} @{environment}: {status} {etag} {}",
                    events.join(" ")
                );
            }
        }
    }

    println!();
    println!("=== Revision Logs ===");
    for summary in &report.environments {
        println!(
            "  {}: revisions {}..={} ({} retained)",
            summary.environment,
            summary.base_revision_id,
            summary.head_revision_id,
            summary.revisions
        );
    }
    println!("  Footprint: {} bytes", report.footprint_bytes);
}
