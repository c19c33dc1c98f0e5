//! Horizon Funding - funding-class workflow over Horizon project records
//!
//! This crate merges project and organization tables, engineers features,
//! trains three classifiers with cross-validation and records every run
//! in a local experiment store.
//!
//! # Modules
//!
//! ## Data
//! - [`preprocessing`] - Merge, cleaning, binning, encoding, split, scaling
//! - [`anomaly`] - Isolation forest used for outlier removal
//! - [`utils`] - Table loading/saving and DataFrame ↔ ndarray helpers
//!
//! ## Models
//! - [`training`] - Logistic regression, random forest, gradient boosting,
//!   cross-validation and metrics
//!
//! ## Orchestration
//! - [`pipeline`] - Catalog, nodes, dependency graph, runner and registry
//! - [`tracking`] - Experiment tracking and pipeline hooks
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod anomaly;
pub mod preprocessing;
pub mod utils;

// Models
pub mod training;

// Orchestration
pub mod pipeline;
pub mod tracking;

// Services
pub mod cli;

pub use error::{HorizonError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{HorizonError, Result};

    // Preprocessing
    pub use crate::preprocessing::{
        add_duration, assign_funding_class, cast_types, drop_na, drop_zero_total_cost,
        load_and_merge, one_hot_encode, remove_outliers, split_data, standardize_numeric_columns,
        TrainTestSplit,
    };

    // Anomaly detection
    pub use crate::anomaly::{IsolationForest, OutlierDetector};

    // Training
    pub use crate::training::{
        evaluate_model, select_best_model, train_gradient_boosting, train_logistic_regression,
        train_random_forest, ClassificationReport, ModelKind, TrainedModel, TrainingConfig,
    };

    // Pipelines
    pub use crate::pipeline::{
        find_pipeline, Artifact, DataCatalog, Node, Parameters, Pipeline, PipelineHook, SequentialRunner,
    };

    // Experiment tracking
    pub use crate::tracking::{ExperimentConfig, ExperimentTracker, Run, RunStatus, TrackingHooks};

    // Data loading
    pub use crate::utils::{DataLoader, DataSaver};
}
