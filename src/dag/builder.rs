// src/dag/builder.rs

//! Incremental construction of a [`TaskGraph`].
//!
//! Nodes are added first, then edges are declared between existing task ids.
//! [`TaskGraphBuilder::build`] checks acyclicity with a topological sort and
//! either returns the complete graph or an error; there is no partial result.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::graph::{TaskGraph, TaskNode};
use crate::errors::{Result, StagedagError};
use crate::types::TaskId;

#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    nodes: BTreeMap<TaskId, TaskNode>,
    edges: BTreeSet<(TaskId, TaskId)>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Fails if another node already uses the same task id.
    pub fn add_task(&mut self, node: TaskNode) -> Result<()> {
        if let Some(existing) = self.nodes.get(node.id()) {
            return Err(StagedagError::DuplicateTaskId {
                task_id: node.id().to_string(),
                first: existing.stage().to_string(),
                second: node.stage().to_string(),
            });
        }

        self.nodes.insert(node.id().clone(), node);
        Ok(())
    }

    /// Declare that `downstream` must not start before `upstream` succeeded.
    ///
    /// Both ids must already have nodes. Declaring the same pair twice is a
    /// no-op; the return value tells whether the edge was new.
    pub fn declare_dependency(&mut self, upstream: &str, downstream: &str) -> Result<bool> {
        let up = self.existing_id(upstream)?;
        let down = self.existing_id(downstream)?;

        if up == down {
            return Err(StagedagError::DagCycle(format!(
                "task '{}' cannot depend on itself",
                up
            )));
        }

        let inserted = self.edges.insert((up, down));
        if !inserted {
            debug!(upstream, downstream, "dependency already declared; ignoring");
        }
        Ok(inserted)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate acyclicity and produce the immutable graph.
    pub fn build(self) -> Result<TaskGraph> {
        let order = topological_order(&self.nodes, &self.edges)?;
        Ok(TaskGraph::from_parts(self.nodes, self.edges, order))
    }

    fn existing_id(&self, id: &str) -> Result<TaskId> {
        self.nodes
            .get_key_value(id)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| StagedagError::UnknownTask(id.to_string()))
    }
}

fn topological_order(
    nodes: &BTreeMap<TaskId, TaskNode>,
    edges: &BTreeSet<(TaskId, TaskId)>,
) -> Result<Vec<TaskId>> {
    // Edge direction: upstream -> downstream.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in nodes.keys() {
        graph.add_node(id.as_str());
    }
    for (up, down) in edges {
        graph.add_edge(up.as_str(), down.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .filter_map(|id| nodes.get_key_value(id).map(|(k, _)| k.clone()))
            .collect()),
        Err(cycle) => Err(StagedagError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            cycle.node_id()
        ))),
    }
}
