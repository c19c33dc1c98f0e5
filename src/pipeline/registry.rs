//! Pipeline definitions and the name → pipeline registry

use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use super::catalog::Artifact;
use super::node::{Node, NodeInputs, Pipeline};
use crate::error::{HorizonError, Result};
use crate::preprocessing::{
    add_duration, assign_funding_class, cast_types, drop_na, drop_zero_total_cost,
    load_and_merge, one_hot_encode, remove_outliers, split_data, standardize_numeric_columns,
};
use crate::training::{evaluate_model, select_best_model, train_model, ModelKind, TrainingConfig};

pub const DEFAULT_PIPELINE: &str = "__default__";
pub const DATA_PROCESSING: &str = "data_processing";
pub const MODEL_TRAINING: &str = "model_training";

fn separator(inputs: &NodeInputs<'_>, idx: usize) -> Result<u8> {
    match inputs.str_param(idx)?.as_bytes() {
        [b] => Ok(*b),
        other => Err(HorizonError::ConfigError(format!(
            "csv_separator must be one byte, got {} bytes",
            other.len()
        ))),
    }
}

fn table_step(name: &str, input: &str, output: &str, step: fn(&DataFrame) -> Result<DataFrame>) -> Node {
    Node::new(name, &[input], &[output], move |inputs| {
        Ok(vec![Artifact::Table(step(inputs.table(0)?)?)])
    })
}

/// Ingest, clean, encode, split, de-noise and scale the raw tables
pub fn data_processing_pipeline() -> Pipeline {
    Pipeline::new(vec![
        Node::new(
            "dp_load_and_merge",
            &["params:project_filepath", "params:organization_filepath", "params:csv_separator"],
            &["processed_data"],
            |inputs| {
                let merged = load_and_merge(inputs.str_param(0)?, inputs.str_param(1)?, separator(inputs, 2)?)?;
                Ok(vec![Artifact::Table(merged)])
            },
        ),
        table_step("dp_cast_types", "processed_data", "typed_data", cast_types),
        table_step("dp_drop_zero_totalcost", "typed_data", "filtered_data", drop_zero_total_cost),
        table_step("dp_drop_na", "filtered_data", "no_na_data", drop_na),
        Node::new(
            "dp_assign_funding_class",
            &["no_na_data", "params:target_column"],
            &["labeled_data"],
            |inputs| {
                let labeled = assign_funding_class(inputs.table(0)?, inputs.str_param(1)?)?;
                Ok(vec![Artifact::Table(labeled)])
            },
        ),
        table_step("dp_add_duration", "labeled_data", "durated_data", add_duration),
        table_step("dp_one_hot_encode", "durated_data", "encoded_data", one_hot_encode),
        Node::new(
            "dp_split_data",
            &["encoded_data", "params:target_column", "params:test_size", "params:split_seed"],
            &["X_train_raw", "X_test", "y_train_raw", "y_test"],
            |inputs| {
                let split = split_data(
                    inputs.table(0)?,
                    inputs.str_param(1)?,
                    inputs.f64_param(2)?,
                    inputs.u64_param(3)?,
                )?;
                Ok(vec![
                    Artifact::Table(split.x_train),
                    Artifact::Table(split.x_test),
                    Artifact::Column(split.y_train),
                    Artifact::Column(split.y_test),
                ])
            },
        ),
        Node::new(
            "dp_remove_outliers",
            &["X_train_raw", "y_train_raw", "params:contamination", "params:outlier_seed"],
            &["X_train_clean", "y_train_clean"],
            |inputs| {
                let (x, y) = remove_outliers(
                    inputs.table(0)?,
                    inputs.column(1)?,
                    inputs.f64_param(2)?,
                    inputs.u64_param(3)?,
                )?;
                Ok(vec![Artifact::Table(x), Artifact::Column(y)])
            },
        ),
        Node::new(
            "mt_standardize",
            &["X_train_clean", "X_test", "params:numeric_columns"],
            &["X_train_scaled", "X_test_scaled"],
            |inputs| {
                let (train, test) =
                    standardize_numeric_columns(inputs.table(0)?, inputs.table(1)?, inputs.list_param(2)?)?;
                Ok(vec![Artifact::Table(train), Artifact::Table(test)])
            },
        ),
    ])
}

fn train_node(kind: ModelKind, features: &str, with_seed: bool) -> Node {
    let key = kind.key();
    let name = format!("mt_train_{}", key);
    let model_out = format!("{}_model", key);
    let scores_out = format!("{}_cv_scores", key);

    let mut input_names = vec![features, "y_train_clean", "params:cv_folds"];
    if with_seed {
        input_names.push("params:model_seed");
    }

    Node::new(&name, &input_names, &[model_out.as_str(), scores_out.as_str()], move |inputs| {
        let mut config = TrainingConfig::default().with_cv_folds(inputs.u64_param(2)? as usize);
        if with_seed {
            config = config.with_random_state(inputs.u64_param(3)?);
        }
        let (model, scores) = train_model(kind, inputs.table(0)?, inputs.column(1)?, &config)?;
        Ok(vec![Artifact::Model(Box::new(model)), Artifact::Scores(scores)])
    })
}

fn evaluate_node(kind: ModelKind, features: &str) -> Node {
    let key = kind.key();
    let model_in = format!("{}_model", key);
    let metrics_out = format!("{}_test_metrics", key);
    Node::new(
        &format!("mt_evaluate_{}", key),
        &[model_in.as_str(), features, "y_test"],
        &[metrics_out.as_str()],
        |inputs| {
            let report = evaluate_model(inputs.model(0)?, inputs.table(1)?, inputs.column(2)?)?;
            Ok(vec![Artifact::Report(report)])
        },
    )
}

/// Train the three classifiers, evaluate them and pick the best
pub fn model_training_pipeline() -> Pipeline {
    Pipeline::new(vec![
        train_node(ModelKind::RandomForest, "X_train_clean", true),
        train_node(ModelKind::GradientBoosting, "X_train_clean", true),
        train_node(ModelKind::LogisticRegression, "X_train_scaled", false),
        evaluate_node(ModelKind::RandomForest, "X_test"),
        evaluate_node(ModelKind::GradientBoosting, "X_test"),
        evaluate_node(ModelKind::LogisticRegression, "X_test_scaled"),
        Node::new(
            "mt_select_best",
            &[
                "rf_model",
                "xgb_model",
                "logistic_model",
                "rf_test_metrics",
                "xgb_test_metrics",
                "logistic_test_metrics",
            ],
            &["best_model", "all_metrics"],
            |inputs| {
                let candidates = [
                    (inputs.model(0)?, inputs.report(3)?),
                    (inputs.model(1)?, inputs.report(4)?),
                    (inputs.model(2)?, inputs.report(5)?),
                ];
                let (best, metrics) = select_best_model(&candidates)?;
                Ok(vec![Artifact::Model(Box::new(best)), Artifact::Metrics(metrics)])
            },
        ),
    ])
}

/// All registered pipelines by name
pub fn register_pipelines() -> BTreeMap<&'static str, Pipeline> {
    let dp = data_processing_pipeline();
    let mt = model_training_pipeline();
    BTreeMap::from([
        (DEFAULT_PIPELINE, dp.clone() + mt.clone()),
        (DATA_PROCESSING, dp),
        (MODEL_TRAINING, mt),
    ])
}

/// Look up a pipeline by name
pub fn find_pipeline(name: &str) -> Result<Pipeline> {
    register_pipelines().remove(name).ok_or_else(|| {
        HorizonError::PipelineError(format!(
            "unknown pipeline '{}'; available: {}, {}, {}",
            name, DEFAULT_PIPELINE, DATA_PROCESSING, MODEL_TRAINING
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::graph::sorted_nodes;

    #[test]
    fn test_registry_names() {
        let pipelines = register_pipelines();
        let names: Vec<&str> = pipelines.keys().copied().collect();
        assert_eq!(names, vec!["__default__", "data_processing", "model_training"]);
        assert_eq!(pipelines["data_processing"].len(), 10);
        assert_eq!(pipelines["model_training"].len(), 7);
        assert_eq!(pipelines["__default__"].len(), 17);
    }

    #[test]
    fn test_default_pipeline_only_needs_params() {
        let pipeline = find_pipeline(DEFAULT_PIPELINE).unwrap();
        for input in pipeline.free_inputs() {
            assert!(input.starts_with("params:"), "unexpected free input {}", input);
        }
        assert!(sorted_nodes(&pipeline).is_ok());
    }

    #[test]
    fn test_model_training_reads_processing_outputs() {
        let free = model_training_pipeline().free_inputs().into_iter().map(String::from).collect::<Vec<_>>();
        for name in ["X_train_clean", "y_train_clean", "X_test", "y_test", "X_train_scaled", "X_test_scaled"] {
            assert!(free.contains(&name.to_string()), "{} missing", name);
        }
    }

    #[test]
    fn test_node_names() {
        let pipeline = model_training_pipeline();
        let names: Vec<&str> = pipeline.nodes().iter().map(|n| n.name()).collect();
        assert!(names.contains(&"mt_train_xgb"));
        assert!(names.contains(&"mt_evaluate_logistic"));
        let logistic = pipeline.nodes().iter().find(|n| n.name() == "mt_train_logistic").unwrap();
        assert_eq!(logistic.inputs(), &["X_train_scaled", "y_train_clean", "params:cv_folds"]);
        assert!(!names.contains(&"mt_standardize"));

        let processing = data_processing_pipeline();
        let last = processing.nodes().last().unwrap();
        assert_eq!(last.name(), "mt_standardize");
        assert_eq!(last.outputs(), &["X_train_scaled", "X_test_scaled"]);
    }

    #[test]
    fn test_unknown_pipeline() {
        assert!(find_pipeline("nope").is_err());
    }
}
