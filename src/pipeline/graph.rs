//! Dependency graph over pipeline nodes

use std::collections::BTreeMap;

use rustworkx_core::petgraph::algo::toposort;
use rustworkx_core::petgraph::graph::{DiGraph, NodeIndex};

use super::node::{Node, Pipeline};
use crate::error::{HorizonError, Result};

/// Producer → consumer graph; node weights index into the pipeline
pub struct NodeGraph {
    graph: DiGraph<usize, String>,
}

impl NodeGraph {
    /// Build the graph, rejecting datasets written by more than one node
    pub fn build(pipeline: &Pipeline) -> Result<Self> {
        let nodes = pipeline.nodes();
        let mut graph = DiGraph::<usize, String>::with_capacity(nodes.len(), nodes.len());
        let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

        let mut producers: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            for output in node.outputs() {
                if let Some(&other) = producers.get(output.as_str()) {
                    return Err(HorizonError::PipelineError(format!(
                        "dataset '{}' is produced by both '{}' and '{}'",
                        output,
                        nodes[other].name(),
                        node.name()
                    )));
                }
                producers.insert(output.as_str(), i);
            }
        }

        for (consumer, node) in nodes.iter().enumerate() {
            for input in node.inputs() {
                if let Some(&producer) = producers.get(input.as_str()) {
                    graph.add_edge(indices[producer], indices[consumer], input.clone());
                }
            }
        }

        Ok(Self { graph })
    }

    /// Node positions in a valid execution order
    pub fn execution_order(&self, nodes: &[Node]) -> Result<Vec<usize>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let at = self.graph[cycle.node_id()];
            let name = nodes.get(at).map(Node::name).unwrap_or("?");
            HorizonError::PipelineError(format!("circular dependency involving node '{}'", name))
        })?;
        Ok(sorted.into_iter().map(|idx| self.graph[idx]).collect())
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Topologically sorted nodes of a pipeline
pub fn sorted_nodes(pipeline: &Pipeline) -> Result<Vec<&Node>> {
    let graph = NodeGraph::build(pipeline)?;
    let nodes = pipeline.nodes();
    Ok(graph
        .execution_order(nodes)?
        .into_iter()
        .map(|i| &nodes[i])
        .collect())
}
