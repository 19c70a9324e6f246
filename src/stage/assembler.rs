// src/stage/assembler.rs

//! Turns a dependency table into a task graph of [`StageExecutor`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::{RetryPolicy, TaskGraph, TaskGraphBuilder, TaskNode};
use crate::errors::{Result, StagedagError};
use crate::pipeline::{PipelineRunner, RunContext};
use crate::stage::executor::StageExecutor;
use crate::stage::table::DependencyTable;
use crate::types::{StageBinding, StageName, TaskId};

/// Per-stage deviations from the assembler defaults.
#[derive(Debug, Clone, Default)]
pub struct StageOverrides {
    /// Explicit task id instead of the one derived from the stage name.
    pub task_id: Option<TaskId>,
    /// Stages to execute instead of just the table entry itself.
    pub binding: Option<StageBinding>,
    pub retry: Option<RetryPolicy>,
}

/// Builds one task node per stage and mirrors the table's edges.
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    package: String,
    context: Arc<RunContext>,
    runner: Arc<dyn PipelineRunner>,
    default_retry: RetryPolicy,
    declared: BTreeMap<StageName, StageOverrides>,
    strict: bool,
}

impl GraphAssembler {
    pub fn new(
        package: impl Into<String>,
        context: RunContext,
        runner: Arc<dyn PipelineRunner>,
    ) -> Self {
        Self {
            package: package.into(),
            context: Arc::new(context),
            runner,
            default_retry: RetryPolicy::default(),
            declared: BTreeMap::new(),
            strict: false,
        }
    }

    pub fn with_default_retry(mut self, retry: RetryPolicy) -> Self {
        self.default_retry = retry;
        self
    }

    /// Declare a stage, optionally with overrides.
    pub fn with_stage(mut self, name: impl Into<String>, overrides: StageOverrides) -> Self {
        self.declared.insert(name.into(), overrides);
        self
    }

    /// In strict mode every stage named by the table must have been declared
    /// with [`GraphAssembler::with_stage`].
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Assemble the complete graph or fail without producing any part of it.
    pub fn assemble(&self, table: &DependencyTable) -> Result<TaskGraph> {
        if self.strict {
            if let Some(unknown) = table.stages().find(|s| !self.declared.contains_key(*s)) {
                return Err(StagedagError::UnknownStage(unknown.to_string()));
            }
        }

        let stages: BTreeSet<&str> = table
            .stages()
            .chain(self.declared.keys().map(String::as_str))
            .collect();

        let mut builder = TaskGraphBuilder::new();
        let mut ids: BTreeMap<&str, TaskId> = BTreeMap::new();

        for stage in stages {
            let node = self.node_for(stage)?;
            debug!(stage, task = %node.id(), stages = %node.stages(), "task node created");
            ids.insert(stage, node.id().clone());
            builder.add_task(node)?;
        }

        for (upstream, downstream) in table.edges() {
            let up = ids
                .get(upstream)
                .ok_or_else(|| StagedagError::UnknownStage(upstream.to_string()))?;
            let down = ids
                .get(downstream)
                .ok_or_else(|| StagedagError::UnknownStage(downstream.to_string()))?;
            builder.declare_dependency(up.as_str(), down.as_str())?;
        }

        let graph = builder.build()?;
        info!(
            tasks = graph.len(),
            edges = graph.edge_count(),
            "task graph assembled"
        );
        Ok(graph)
    }

    fn node_for(&self, stage: &str) -> Result<TaskNode> {
        let overrides = self.declared.get(stage);

        let task_id = match overrides.and_then(|o| o.task_id.clone()) {
            Some(id) => id,
            None => TaskId::from_stage(stage)?,
        };
        let binding = match overrides.and_then(|o| o.binding.clone()) {
            Some(binding) => binding,
            None => StageBinding::single(stage)?,
        };
        let retry = overrides
            .and_then(|o| o.retry)
            .unwrap_or(self.default_retry);

        let executor = StageExecutor::new(
            self.package.clone(),
            binding,
            Arc::clone(&self.context),
            Arc::clone(&self.runner),
        );

        Ok(TaskNode::new(task_id, stage, executor, retry))
    }
}
