//! Pipeline hooks that mirror a run into the experiment tracker

use std::path::PathBuf;
use std::sync::Arc;

use polars::prelude::*;
use tracing::{debug, warn};

use super::tracker::{ActiveRun, ExperimentTracker, RunStatus};
use crate::error::{HorizonError, Result};
use crate::pipeline::{Artifact, DataCatalog, Node, Pipeline, PipelineHook, PARAMS_PREFIX};
use crate::utils::DataSaver;

/// Dataset whose model is serialized as the run's model artifact
pub const BEST_MODEL: &str = "best_model";
/// Dataset whose entries are logged as run metrics
pub const ALL_METRICS: &str = "all_metrics";

/// Logs params, saved tables, the selected model and the final metrics.
///
/// Tables and columns are written to `<data_dir>/<name>.csv` before being
/// attached to the run, so later runs can load them back from the catalog.
pub struct TrackingHooks {
    tracker: Arc<ExperimentTracker>,
    data_dir: PathBuf,
    run: Option<ActiveRun>,
}

impl TrackingHooks {
    pub fn new(tracker: Arc<ExperimentTracker>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            tracker,
            data_dir: data_dir.into(),
            run: None,
        }
    }

    /// Id of the run currently open, if any
    pub fn run_id(&self) -> Option<&str> {
        self.run.as_ref().map(ActiveRun::run_id)
    }

    fn active(&self) -> Result<&ActiveRun> {
        self.run
            .as_ref()
            .ok_or_else(|| HorizonError::TrackingError("pipeline run not started".to_string()))
    }

    fn write_table(&self, name: &str, mut df: DataFrame) -> Result<()> {
        let path = self.data_dir.join(format!("{}.csv", name));
        DataSaver::save_csv(&mut df, &path)?;
        debug!(dataset = name, path = %path.display(), "Persisted dataset");
        self.active()?.log_artifact(&path)
    }
}

impl PipelineHook for TrackingHooks {
    fn before_pipeline_run(&mut self, pipeline_name: &str, pipeline: &Pipeline, _catalog: &DataCatalog) -> Result<()> {
        let run = self.tracker.start_run(pipeline_name)?;
        run.set_tag("pipeline", pipeline_name)?;
        run.set_tag("nodes", pipeline.len().to_string())?;
        self.run = Some(run);
        Ok(())
    }

    fn before_node_run(&mut self, _node: &Node, inputs: &[(&str, &Artifact)]) -> Result<()> {
        let run = self.active()?;
        for (name, artifact) in inputs {
            if let (Some(key), Artifact::Param(value)) = (name.strip_prefix(PARAMS_PREFIX), artifact) {
                run.log_param(key, value.to_string())?;
            }
        }
        Ok(())
    }

    fn after_dataset_saved(&mut self, dataset_name: &str, data: &Artifact) -> Result<()> {
        match data {
            Artifact::Table(df) => self.write_table(dataset_name, df.clone())?,
            Artifact::Column(s) => self.write_table(dataset_name, s.clone().into_frame())?,
            Artifact::Model(model) if dataset_name == BEST_MODEL => {
                let run = self.active()?;
                run.log_text(&format!("{}.json", BEST_MODEL), &model.to_json()?)?;
                run.set_tag("best_model", model.kind.to_string())?;
            }
            Artifact::Metrics(metrics) if dataset_name == ALL_METRICS => {
                let run = self.active()?;
                for (name, value) in metrics {
                    run.log_metric(name.as_str(), *value)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn after_pipeline_run(&mut self, _pipeline_name: &str, _catalog: &DataCatalog) -> Result<()> {
        if let Some(run) = self.run.take() {
            run.end(RunStatus::Finished)?;
        }
        Ok(())
    }

    fn on_pipeline_error(&mut self, pipeline_name: &str, error: &HorizonError) {
        if let Some(run) = self.run.take() {
            if let Err(e) = run.set_tag("error", error.to_string()) {
                warn!(pipeline = pipeline_name, error = %e, "Failed to tag tracking run");
            }
            if let Err(e) = run.end(RunStatus::Failed) {
                warn!(pipeline = pipeline_name, error = %e, "Failed to close tracking run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ParamValue, SequentialRunner};
    use tempfile::TempDir;

    fn table_pipeline() -> Pipeline {
        Pipeline::new(vec![
            Node::new("make", &["params:rows"], &["table", "labels"], |inputs| {
                let n = inputs.u64_param(0)? as i64;
                let values: Vec<i64> = (0..n).collect();
                let df = df!("x" => &values)?;
                let labels = Series::new("funding_class".into(), values);
                Ok(vec![Artifact::Table(df), Artifact::Column(labels)])
            }),
            Node::new("metrics", &["table"], &["all_metrics"], |inputs| {
                let rows = inputs.table(0)?.height() as f64;
                Ok(vec![Artifact::Metrics([("rows".to_string(), rows)].into_iter().collect())])
            }),
        ])
    }

    #[test]
    fn test_tracks_params_datasets_and_metrics() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(ExperimentTracker::with_dir(dir.path().join("mlruns")).unwrap());
        let data_dir = dir.path().join("data");

        let mut catalog = DataCatalog::new();
        catalog.add_param("rows", ParamValue::Integer(4));
        let mut runner =
            SequentialRunner::new().with_hook(Box::new(TrackingHooks::new(Arc::clone(&tracker), &data_dir)));
        runner.run("demo", &table_pipeline(), &mut catalog).unwrap();

        let runs = tracker.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.status, RunStatus::Finished);
        assert_eq!(run.params["rows"], "4");
        assert_eq!(run.metrics["rows"], 4.0);
        assert_eq!(run.tags["pipeline"], "demo");
        assert!(run.artifacts.contains(&"artifacts/table.csv".to_string()));
        assert!(run.artifacts.contains(&"artifacts/labels.csv".to_string()));

        let labels = std::fs::read_to_string(data_dir.join("labels.csv")).unwrap();
        assert!(labels.starts_with("funding_class"));
    }

    #[test]
    fn test_failed_pipeline_marks_run_failed() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(ExperimentTracker::with_dir(dir.path().join("mlruns")).unwrap());
        let pipeline = Pipeline::new(vec![Node::new("boom", &[], &["x"], |_| {
            Err(HorizonError::DataError("broken input".into()))
        })]);

        let mut runner =
            SequentialRunner::new().with_hook(Box::new(TrackingHooks::new(Arc::clone(&tracker), dir.path())));
        assert!(runner.run("bad", &pipeline, &mut DataCatalog::new()).is_err());

        let runs = tracker.list_runs().unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].tags["error"].contains("broken input"));
        assert!(tracker.current_run().is_none());
    }
}
