//! Experiment Tracking Module
//!
//! Records pipeline runs (params, metrics, tags, artifacts) in a local
//! file store and plugs into the runner through `TrackingHooks`.

mod hooks;
mod storage;
mod tracker;

pub use hooks::{TrackingHooks, ALL_METRICS, BEST_MODEL};
pub use storage::{LocalStorage, StorageBackend};
pub use tracker::{ActiveRun, Experiment, ExperimentConfig, ExperimentTracker, Metric, Run, RunStatus};
