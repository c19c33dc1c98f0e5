//! Sequential pipeline runner with lifecycle hooks

use std::time::Instant;

use tracing::{error, info};

use super::catalog::{Artifact, DataCatalog};
use super::graph::sorted_nodes;
use super::node::{Node, Pipeline};
use crate::error::{HorizonError, Result};

/// Observer of a pipeline run. Every method defaults to a no-op.
pub trait PipelineHook: Send {
    fn before_pipeline_run(&mut self, _pipeline_name: &str, _pipeline: &Pipeline, _catalog: &DataCatalog) -> Result<()> {
        Ok(())
    }

    /// Called with the node's resolved inputs, keyed by input name
    fn before_node_run(&mut self, _node: &Node, _inputs: &[(&str, &Artifact)]) -> Result<()> {
        Ok(())
    }

    fn after_dataset_saved(&mut self, _dataset_name: &str, _data: &Artifact) -> Result<()> {
        Ok(())
    }

    fn after_pipeline_run(&mut self, _pipeline_name: &str, _catalog: &DataCatalog) -> Result<()> {
        Ok(())
    }

    fn on_pipeline_error(&mut self, _pipeline_name: &str, _error: &HorizonError) {}
}

/// Runs nodes one at a time in dependency order
#[derive(Default)]
pub struct SequentialRunner {
    hooks: Vec<Box<dyn PipelineHook>>,
}

impl SequentialRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Box<dyn PipelineHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Run the pipeline against the catalog; outputs are left in the catalog
    pub fn run(&mut self, pipeline_name: &str, pipeline: &Pipeline, catalog: &mut DataCatalog) -> Result<()> {
        let start = Instant::now();
        info!(pipeline = pipeline_name, nodes = pipeline.len(), "Running pipeline");

        match self.run_inner(pipeline_name, pipeline, catalog) {
            Ok(()) => {
                info!(
                    pipeline = pipeline_name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Pipeline completed"
                );
                Ok(())
            }
            Err(e) => {
                error!(pipeline = pipeline_name, error = %e, "Pipeline failed");
                for hook in &mut self.hooks {
                    hook.on_pipeline_error(pipeline_name, &e);
                }
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, pipeline_name: &str, pipeline: &Pipeline, catalog: &mut DataCatalog) -> Result<()> {
        let order = sorted_nodes(pipeline)?;

        let missing: Vec<&str> = pipeline
            .free_inputs()
            .into_iter()
            .filter(|name| !catalog.exists(name))
            .collect();
        if !missing.is_empty() {
            return Err(HorizonError::PipelineError(format!(
                "pipeline '{}' has unresolved inputs: {}",
                pipeline_name,
                missing.join(", ")
            )));
        }

        for hook in &mut self.hooks {
            hook.before_pipeline_run(pipeline_name, pipeline, catalog)?;
        }

        for (step, node) in order.iter().enumerate() {
            self.run_node(node, catalog, step + 1, order.len())?;
        }

        for hook in &mut self.hooks {
            hook.after_pipeline_run(pipeline_name, catalog)?;
        }
        Ok(())
    }

    fn run_node(&mut self, node: &Node, catalog: &mut DataCatalog, step: usize, total: usize) -> Result<()> {
        let start = Instant::now();
        info!(node = node.name(), step, total, "Running node");

        for name in node.inputs() {
            catalog.load(name)?;
        }

        let outputs = {
            let values: Vec<&Artifact> = node
                .inputs()
                .iter()
                .map(|name| catalog.get(name).ok_or_else(|| HorizonError::DatasetNotFound(name.clone())))
                .collect::<Result<_>>()?;

            let named: Vec<(&str, &Artifact)> = node
                .inputs()
                .iter()
                .map(String::as_str)
                .zip(values.iter().copied())
                .collect();
            for hook in &mut self.hooks {
                hook.before_node_run(node, &named)?;
            }

            node.run(values).map_err(|e| match e {
                HorizonError::PipelineError(_) => e,
                other => HorizonError::PipelineError(format!("node '{}' failed: {}", node.name(), other)),
            })?
        };

        for (name, artifact) in node.outputs().iter().zip(outputs) {
            catalog.save(name.clone(), artifact);
            let saved = catalog.get(name).ok_or_else(|| HorizonError::DatasetNotFound(name.clone()))?;
            for hook in &mut self.hooks {
                hook.after_dataset_saved(name, saved)?;
            }
        }

        info!(
            node = node.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Completed node"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::catalog::ParamValue;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl PipelineHook for Recorder {
        fn before_pipeline_run(&mut self, name: &str, _: &Pipeline, _: &DataCatalog) -> Result<()> {
            self.0.lock().unwrap().push(format!("start:{}", name));
            Ok(())
        }

        fn before_node_run(&mut self, node: &Node, inputs: &[(&str, &Artifact)]) -> Result<()> {
            let names: Vec<&str> = inputs.iter().map(|(n, _)| *n).collect();
            self.0.lock().unwrap().push(format!("node:{}({})", node.name(), names.join(",")));
            Ok(())
        }

        fn after_dataset_saved(&mut self, name: &str, _: &Artifact) -> Result<()> {
            self.0.lock().unwrap().push(format!("saved:{}", name));
            Ok(())
        }

        fn after_pipeline_run(&mut self, name: &str, _: &DataCatalog) -> Result<()> {
            self.0.lock().unwrap().push(format!("end:{}", name));
            Ok(())
        }

        fn on_pipeline_error(&mut self, name: &str, _: &HorizonError) {
            self.0.lock().unwrap().push(format!("error:{}", name));
        }
    }

    fn doubling_pipeline() -> Pipeline {
        Pipeline::new(vec![
            Node::new("double", &["x"], &["y"], |inputs| match inputs.param(0)? {
                ParamValue::Float(v) => Ok(vec![Artifact::Scores(vec![v * 2.0])]),
                _ => Err(HorizonError::PipelineError("bad".into())),
            }),
            Node::new("scale", &["params:factor"], &["x"], |inputs| {
                Ok(vec![Artifact::Param(ParamValue::Float(inputs.f64_param(0)?))])
            }),
        ])
    }

    #[test]
    fn test_hooks_fire_in_order() {
        let recorder = Recorder::default();
        let mut runner = SequentialRunner::new().with_hook(Box::new(recorder.clone()));
        let mut catalog = DataCatalog::new();
        catalog.add_param("factor", ParamValue::Float(3.0));

        runner.run("demo", &doubling_pipeline(), &mut catalog).unwrap();

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start:demo",
                "node:scale(params:factor)",
                "saved:x",
                "node:double(x)",
                "saved:y",
                "end:demo",
            ]
        );
        assert!(matches!(catalog.get("y"), Some(Artifact::Scores(s)) if s == &vec![6.0]));
    }

    #[test]
    fn test_unresolved_input_fails_before_start() {
        let recorder = Recorder::default();
        let mut runner = SequentialRunner::new().with_hook(Box::new(recorder.clone()));
        let mut catalog = DataCatalog::new();

        let err = runner.run("demo", &doubling_pipeline(), &mut catalog).unwrap_err();
        assert!(err.to_string().contains("params:factor"));
        assert_eq!(recorder.0.lock().unwrap().clone(), vec!["error:demo"]);
    }

    #[test]
    fn test_node_error_aborts() {
        let pipeline = Pipeline::new(vec![
            Node::new("fail", &[], &["a"], |_| Err(HorizonError::DataError("boom".into()))),
            Node::new("after", &["a"], &["b"], |_| Ok(vec![Artifact::Scores(vec![])])),
        ]);
        let mut catalog = DataCatalog::new();
        let err = SequentialRunner::new().run("p", &pipeline, &mut catalog).unwrap_err();

        assert!(err.to_string().contains("node 'fail' failed"));
        assert!(!catalog.contains("b"));
    }
}
