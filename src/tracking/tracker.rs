//! Experiment Tracker Implementation
//!
//! Track runs, parameters, metrics and artifacts against a local file store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::storage::{LocalStorage, StorageBackend};
use crate::error::{HorizonError, Result};

/// Configuration for experiment tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Root of the run store
    pub output_dir: PathBuf,
    /// Experiment name
    pub experiment_name: String,
    /// Keep every logged metric value, not only the latest
    pub enable_metrics_history: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./mlruns"),
            experiment_name: "horizon-funding".to_string(),
            enable_metrics_history: true,
        }
    }
}

impl ExperimentConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }
}

/// A single metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    /// Step/epoch number
    pub step: u64,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, step: u64) -> Self {
        Self {
            name: name.into(),
            value,
            step,
            timestamp: Utc::now(),
        }
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is currently running
    Running,
    /// Run completed successfully
    Finished,
    /// Run failed
    Failed,
    /// Run was abandoned before it was closed
    Killed,
}

/// A run within an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub start_time: DateTime<Utc>,
    /// End time (None while running)
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    /// Latest value per metric
    pub metrics: BTreeMap<String, f64>,
    pub metrics_history: Vec<Metric>,
    pub tags: BTreeMap<String, String>,
    /// Artifact paths relative to the run directory
    pub artifacts: Vec<String>,
    pub status: RunStatus,
}

impl Run {
    pub fn new(experiment_id: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name: run_name.into(),
            experiment_id: experiment_id.into(),
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metrics_history: Vec::new(),
            tags: BTreeMap::new(),
            artifacts: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Run duration in seconds
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// An experiment groups runs under a name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

impl Experiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            experiment_id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            created_at: Utc::now(),
            tags: BTreeMap::new(),
        }
    }
}

/// Experiment tracker.
///
/// At most one run is active at a time; runs are persisted on every
/// mutation so an interrupted process still leaves a readable record.
pub struct ExperimentTracker {
    config: ExperimentConfig,
    storage: Box<dyn StorageBackend>,
    experiment: Experiment,
    current_run: RwLock<Option<Run>>,
}

impl std::fmt::Debug for ExperimentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentTracker")
            .field("config", &self.config)
            .field("experiment", &self.experiment)
            .finish()
    }
}

impl ExperimentTracker {
    /// Open the store and get or create the configured experiment
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        let storage = Box::new(LocalStorage::new(config.output_dir.clone())?);
        Self::with_storage(config, storage)
    }

    /// Open with the default configuration rooted at `output_dir`
    pub fn with_dir(output_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(ExperimentConfig::default().with_output_dir(output_dir))
    }

    pub fn with_storage(config: ExperimentConfig, storage: Box<dyn StorageBackend>) -> Result<Self> {
        let experiment = match storage
            .load_experiments()?
            .into_iter()
            .find(|e| e.name == config.experiment_name)
        {
            Some(existing) => existing,
            None => {
                let created = Experiment::new(&config.experiment_name);
                storage.save_experiment(&created)?;
                info!(experiment = %created.name, id = %created.experiment_id, "Created experiment");
                created
            }
        };

        Ok(Self {
            config,
            storage,
            experiment,
            current_run: RwLock::new(None),
        })
    }

    /// The experiment runs are recorded under
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Start a run; the returned handle closes it as `Killed` if dropped open
    pub fn start_run(self: &Arc<Self>, run_name: impl Into<String>) -> Result<ActiveRun> {
        let mut current = self.current_run.write();
        if let Some(active) = current.as_ref() {
            return Err(HorizonError::TrackingError(format!(
                "run {} is still active",
                active.run_id
            )));
        }

        let run = Run::new(&self.experiment.experiment_id, run_name);
        self.storage.save_run(&run)?;
        let run_id = run.run_id.clone();
        info!(run_id = %run_id, experiment = %self.experiment.name, "Started run");
        *current = Some(run);

        Ok(ActiveRun {
            tracker: Arc::clone(self),
            run_id,
            closed: false,
        })
    }

    fn with_active_run<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Run, &dyn StorageBackend) -> Result<()>,
    {
        let mut current = self.current_run.write();
        let run = current
            .as_mut()
            .ok_or_else(|| HorizonError::TrackingError("no active run".to_string()))?;
        f(run, self.storage.as_ref())?;
        self.storage.save_run(run)
    }

    pub fn log_param(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        debug!(param = %key, value = %value, "Logged param");
        self.with_active_run(|run, _| {
            run.params.insert(key, value);
            Ok(())
        })
    }

    pub fn log_metric(&self, name: impl Into<String>, value: f64, step: Option<u64>) -> Result<()> {
        let name = name.into();
        let keep_history = self.config.enable_metrics_history;
        debug!(metric = %name, value, "Logged metric");
        self.with_active_run(|run, _| {
            if keep_history {
                run.metrics_history.push(Metric::new(&name, value, step.unwrap_or(0)));
            }
            run.metrics.insert(name, value);
            Ok(())
        })
    }

    pub fn log_metrics(&self, metrics: &BTreeMap<String, f64>, step: Option<u64>) -> Result<()> {
        for (name, value) in metrics {
            self.log_metric(name.as_str(), *value, step)?;
        }
        Ok(())
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.with_active_run(|run, _| {
            run.tags.insert(key, value);
            Ok(())
        })
    }

    /// Copy a local file into the run's artifact directory
    pub fn log_artifact(&self, local_path: impl AsRef<Path>) -> Result<()> {
        let local_path = local_path.as_ref();
        self.with_active_run(|run, storage| {
            let stored = storage.store_artifact(run, local_path)?;
            debug!(artifact = %stored, "Logged artifact");
            if !run.artifacts.contains(&stored) {
                run.artifacts.push(stored);
            }
            Ok(())
        })
    }

    /// Write text content as an artifact under `name`
    pub fn log_text(&self, name: &str, content: &str) -> Result<()> {
        self.with_active_run(|run, storage| {
            let stored = storage.store_text(run, name, content)?;
            if !run.artifacts.contains(&stored) {
                run.artifacts.push(stored);
            }
            Ok(())
        })
    }

    /// Close the active run with the given status
    pub fn end_run(&self, status: RunStatus) -> Result<Run> {
        let mut current = self.current_run.write();
        let mut run = current
            .take()
            .ok_or_else(|| HorizonError::TrackingError("no active run".to_string()))?;
        run.end_time = Some(Utc::now());
        run.status = status;
        self.storage.save_run(&run)?;

        info!(
            run_id = %run.run_id,
            status = ?status,
            duration_secs = run.duration_secs(),
            metrics = run.metrics.len(),
            artifacts = run.artifacts.len(),
            "Ended run"
        );
        Ok(run)
    }

    /// Snapshot of the active run
    pub fn current_run(&self) -> Option<Run> {
        self.current_run.read().clone()
    }

    /// All persisted runs of this experiment, oldest first
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs = self.storage.load_runs(&self.experiment.experiment_id)?;
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(runs)
    }

    /// Best finished run by a metric
    pub fn best_run(&self, metric_name: &str, maximize: bool) -> Result<Option<Run>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| r.status == RunStatus::Finished)
            .filter_map(|r| r.metrics.get(metric_name).copied().map(|v| (v, r)))
            .max_by(|(a, _), (b, _)| {
                if maximize {
                    a.total_cmp(b)
                } else {
                    b.total_cmp(a)
                }
            })
            .map(|(_, r)| r))
    }

    /// Directory holding a run's files
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.storage.run_dir(&self.experiment.experiment_id, run_id)
    }
}

/// Scoped handle to the tracker's active run
pub struct ActiveRun {
    tracker: Arc<ExperimentTracker>,
    run_id: String,
    closed: bool,
}

impl ActiveRun {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn tracker(&self) -> &ExperimentTracker {
        &self.tracker
    }

    pub fn log_param(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.tracker.log_param(key, value)
    }

    pub fn log_metric(&self, name: impl Into<String>, value: f64) -> Result<()> {
        self.tracker.log_metric(name, value, None)
    }

    pub fn log_artifact(&self, local_path: impl AsRef<Path>) -> Result<()> {
        self.tracker.log_artifact(local_path)
    }

    pub fn log_text(&self, name: &str, content: &str) -> Result<()> {
        self.tracker.log_text(name, content)
    }

    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.tracker.set_tag(key, value)
    }

    /// Close the run
    pub fn end(mut self, status: RunStatus) -> Result<Run> {
        self.closed = true;
        self.tracker.end_run(status)
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.tracker.end_run(RunStatus::Killed) {
                warn!(run_id = %self.run_id, error = %e, "Failed to close abandoned run");
            }
        }
    }
}
