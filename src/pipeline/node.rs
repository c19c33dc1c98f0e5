//! Nodes and pipelines

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Add;
use std::sync::Arc;

use polars::prelude::*;

use super::catalog::{Artifact, ParamValue};
use crate::error::{HorizonError, Result};
use crate::training::{ClassificationReport, TrainedModel};

/// Function run by a node: inputs in declaration order in, outputs in
/// declaration order out
pub type NodeFn = Arc<dyn Fn(&NodeInputs<'_>) -> Result<Vec<Artifact>> + Send + Sync>;

/// A named step reading and writing catalog entries
#[derive(Clone)]
pub struct Node {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    func: NodeFn,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl Node {
    pub fn new<F>(name: &str, inputs: &[&str], outputs: &[&str], func: F) -> Self
    where
        F: Fn(&NodeInputs<'_>) -> Result<Vec<Artifact>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Call the node function and check the output arity
    pub fn run(&self, values: Vec<&Artifact>) -> Result<Vec<Artifact>> {
        if values.len() != self.inputs.len() {
            return Err(HorizonError::PipelineError(format!(
                "node '{}' expects {} inputs, got {}",
                self.name,
                self.inputs.len(),
                values.len()
            )));
        }

        let inputs = NodeInputs {
            node: &self.name,
            names: &self.inputs,
            values,
        };
        let outputs = (self.func)(&inputs)?;

        if outputs.len() != self.outputs.len() {
            return Err(HorizonError::PipelineError(format!(
                "node '{}' declared {} outputs but returned {}",
                self.name,
                self.outputs.len(),
                outputs.len()
            )));
        }
        Ok(outputs)
    }
}

/// Typed positional access to a node's resolved inputs
pub struct NodeInputs<'a> {
    node: &'a str,
    names: &'a [String],
    values: Vec<&'a Artifact>,
}

impl<'a> NodeInputs<'a> {
    fn at(&self, idx: usize) -> Result<&'a Artifact> {
        self.values.get(idx).copied().ok_or_else(|| {
            HorizonError::PipelineError(format!("node '{}' has no input #{}", self.node, idx))
        })
    }

    fn mismatch(&self, idx: usize, expected: &str, found: &Artifact) -> HorizonError {
        let name = self.names.get(idx).map(String::as_str).unwrap_or("?");
        HorizonError::PipelineError(format!(
            "node '{}': input '{}' is a {}, expected {}",
            self.node,
            name,
            found.kind(),
            expected
        ))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn table(&self, idx: usize) -> Result<&'a DataFrame> {
        match self.at(idx)? {
            Artifact::Table(df) => Ok(df),
            other => Err(self.mismatch(idx, "table", other)),
        }
    }

    pub fn column(&self, idx: usize) -> Result<&'a Series> {
        match self.at(idx)? {
            Artifact::Column(s) => Ok(s),
            other => Err(self.mismatch(idx, "column", other)),
        }
    }

    pub fn model(&self, idx: usize) -> Result<&'a TrainedModel> {
        match self.at(idx)? {
            Artifact::Model(m) => Ok(m.as_ref()),
            other => Err(self.mismatch(idx, "model", other)),
        }
    }

    pub fn report(&self, idx: usize) -> Result<&'a ClassificationReport> {
        match self.at(idx)? {
            Artifact::Report(r) => Ok(r),
            other => Err(self.mismatch(idx, "report", other)),
        }
    }

    pub fn param(&self, idx: usize) -> Result<&'a ParamValue> {
        match self.at(idx)? {
            Artifact::Param(p) => Ok(p),
            other => Err(self.mismatch(idx, "param", other)),
        }
    }

    pub fn str_param(&self, idx: usize) -> Result<&'a str> {
        let p = self.param(idx)?;
        p.as_str().ok_or_else(|| self.mismatch(idx, "text param", &Artifact::Param(p.clone())))
    }

    pub fn f64_param(&self, idx: usize) -> Result<f64> {
        let p = self.param(idx)?;
        p.as_f64().ok_or_else(|| self.mismatch(idx, "numeric param", &Artifact::Param(p.clone())))
    }

    pub fn u64_param(&self, idx: usize) -> Result<u64> {
        let p = self.param(idx)?;
        p.as_u64().ok_or_else(|| self.mismatch(idx, "integer param", &Artifact::Param(p.clone())))
    }

    pub fn list_param(&self, idx: usize) -> Result<&'a [String]> {
        let p = self.param(idx)?;
        p.as_list().ok_or_else(|| self.mismatch(idx, "list param", &Artifact::Param(p.clone())))
    }
}

/// An ordered set of nodes; combine with `+`
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    nodes: Vec<Node>,
}

impl Pipeline {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every dataset some node produces
    pub fn outputs(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter().map(String::as_str))
            .collect()
    }

    /// Inputs no node in this pipeline produces (parameters included)
    pub fn free_inputs(&self) -> BTreeSet<&str> {
        let produced = self.outputs();
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter().map(String::as_str))
            .filter(|name| !produced.contains(name))
            .collect()
    }
}

impl Add for Pipeline {
    type Output = Pipeline;

    /// Concatenate, skipping nodes whose name is already present
    fn add(mut self, other: Pipeline) -> Pipeline {
        for node in other.nodes {
            if !self.nodes.iter().any(|n| n.name == node.name) {
                self.nodes.push(node);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passthrough(name: &str, input: &str, output: &str) -> Node {
        Node::new(name, &[input], &[output], |inputs| {
            Ok(vec![Artifact::Scores(vec![inputs.f64_param(0)?])])
        })
    }

    #[test]
    fn test_run_checks_types_and_arity() {
        let node = passthrough("n", "params:x", "y");
        let value = Artifact::Param(ParamValue::Float(1.5));
        let out = node.run(vec![&value]).unwrap();
        assert!(matches!(&out[0], Artifact::Scores(s) if s == &vec![1.5]));

        let wrong = Artifact::Scores(vec![]);
        let err = node.run(vec![&wrong]).unwrap_err().to_string();
        assert!(err.contains("is a scores, expected param"), "{}", err);

        assert!(node.run(vec![]).is_err());
    }

    #[test]
    fn test_declared_outputs_enforced() {
        let node = Node::new("two", &[], &["a", "b"], |_| Ok(vec![Artifact::Scores(vec![])]));
        assert!(matches!(node.run(vec![]), Err(HorizonError::PipelineError(_))));
    }

    #[test]
    fn test_pipeline_add_and_free_inputs() {
        let a = Pipeline::new(vec![passthrough("a", "params:x", "mid")]);
        let b = Pipeline::new(vec![passthrough("b", "mid", "out"), passthrough("a", "params:x", "mid")]);
        let combined = a + b;

        assert_eq!(combined.len(), 2);
        assert_eq!(combined.free_inputs().into_iter().collect::<Vec<_>>(), vec!["params:x"]);
        assert!(combined.outputs().contains("out"));
    }
}
