//! Pipeline framework
//!
//! Provides the pieces the workflow is built from:
//! - Data catalog of named artifacts and parameters
//! - Nodes and composable pipelines
//! - Dependency graph and topological ordering
//! - Sequential runner with lifecycle hooks
//! - The registered data-processing and model-training pipelines

mod catalog;
mod graph;
mod node;
mod params;
mod registry;
mod runner;

pub use catalog::{Artifact, DataCatalog, ParamValue, PARAMS_PREFIX};
pub use graph::{sorted_nodes, NodeGraph};
pub use node::{Node, NodeFn, NodeInputs, Pipeline};
pub use params::Parameters;
pub use registry::{
    data_processing_pipeline, find_pipeline, model_training_pipeline, register_pipelines,
    DATA_PROCESSING, DEFAULT_PIPELINE, MODEL_TRAINING,
};
pub use runner::{PipelineHook, SequentialRunner};
