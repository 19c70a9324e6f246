// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::dag::retry::RetryPolicy;
use crate::stage::StageExecutor;
use crate::types::{StageBinding, TaskId};

/// A scheduler-visible unit of work bound to one or more pipeline stages.
#[derive(Debug, Clone)]
pub struct TaskNode {
    id: TaskId,
    /// Name of the dependency-table entry this node was created for.
    stage: String,
    executor: StageExecutor,
    retry: RetryPolicy,
}

impl TaskNode {
    pub fn new(
        id: TaskId,
        stage: impl Into<String>,
        executor: StageExecutor,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id,
            stage: stage.into(),
            executor,
            retry,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn stages(&self) -> &StageBinding {
        self.executor.stages()
    }

    pub fn executor(&self) -> &StageExecutor {
        &self.executor
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

/// Immutable task graph: nodes plus deduplicated dependency edges.
///
/// Only constructed through [`crate::dag::TaskGraphBuilder`], which guarantees
/// that every edge endpoint exists and that the graph is acyclic.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: BTreeMap<TaskId, TaskNode>,
    upstream: BTreeMap<TaskId, BTreeSet<TaskId>>,
    downstream: BTreeMap<TaskId, BTreeSet<TaskId>>,
    order: Vec<TaskId>,
}

impl TaskGraph {
    pub(crate) fn from_parts(
        nodes: BTreeMap<TaskId, TaskNode>,
        edges: BTreeSet<(TaskId, TaskId)>,
        order: Vec<TaskId>,
    ) -> Self {
        let mut upstream: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();
        let mut downstream: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();

        for id in nodes.keys() {
            upstream.insert(id.clone(), BTreeSet::new());
            downstream.insert(id.clone(), BTreeSet::new());
        }

        for (up, down) in edges {
            if let Some(set) = downstream.get_mut(&up) {
                set.insert(down.clone());
            }
            if let Some(set) = upstream.get_mut(&down) {
                set.insert(up);
            }
        }

        Self {
            nodes,
            upstream,
            downstream,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Task ids in a deterministic topological order.
    pub fn topological_order(&self) -> &[TaskId] {
        &self.order
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// All edges as `(upstream, downstream)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&TaskId, &TaskId)> {
        self.downstream
            .iter()
            .flat_map(|(up, downs)| downs.iter().map(move |down| (up, down)))
    }

    pub fn edge_count(&self) -> usize {
        self.downstream.values().map(BTreeSet::len).sum()
    }

    /// Tasks that must succeed before `id` may start.
    pub fn upstream_of(&self, id: &str) -> impl Iterator<Item = &TaskId> {
        self.upstream.get(id).into_iter().flatten()
    }

    /// Tasks that wait on `id`.
    pub fn downstream_of(&self, id: &str) -> impl Iterator<Item = &TaskId> {
        self.downstream.get(id).into_iter().flatten()
    }

    /// Tasks without upstream dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &TaskId> {
        self.order
            .iter()
            .filter(|id| self.upstream.get(*id).is_none_or(BTreeSet::is_empty))
    }

    /// Whether a path of one or more edges leads from `from` to `to`.
    pub fn precedes(&self, from: &str, to: &str) -> bool {
        let mut stack: Vec<&TaskId> = self.downstream_of(from).collect();
        let mut seen: BTreeSet<&TaskId> = BTreeSet::new();

        while let Some(id) = stack.pop() {
            if id.as_str() == to {
                return true;
            }
            if seen.insert(id) {
                stack.extend(self.downstream_of(id.as_str()));
            }
        }

        false
    }
}
