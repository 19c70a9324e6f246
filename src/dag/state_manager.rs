// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::RunSummary;
use crate::dag::task_info::{ScheduledTask, TaskRunInfo, TaskState};
use crate::types::{RunId, TaskId};

/// State of every task for one run of the graph.
#[derive(Debug, Clone)]
pub struct DagRun {
    pub run_id: RunId,
    pub logical_date: DateTime<Utc>,
    pub tasks: BTreeMap<TaskId, TaskRunInfo>,
}

impl DagRun {
    /// A new run with every task `Pending`.
    pub fn new(run_id: RunId, logical_date: DateTime<Utc>, graph: &TaskGraph) -> Self {
        let tasks = graph
            .topological_order()
            .iter()
            .map(|id| (id.clone(), TaskRunInfo::default()))
            .collect();

        Self {
            run_id,
            logical_date,
            tasks,
        }
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|info| info.state)
    }

    /// Whether every upstream task of `task` succeeded in this run.
    pub fn deps_satisfied(&self, graph: &TaskGraph, task: &str) -> bool {
        graph.upstream_of(task).all(|up| {
            matches!(
                self.tasks.get(up).map(|i| i.state),
                Some(TaskState::Succeeded)
            )
        })
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            run_id: self.run_id,
            logical_date: self.logical_date,
            succeeded: Vec::new(),
            failed: Vec::new(),
            upstream_failed: Vec::new(),
        };

        for (id, info) in &self.tasks {
            match info.state {
                TaskState::Succeeded => summary.succeeded.push(id.clone()),
                TaskState::Failed => summary
                    .failed
                    .push((id.clone(), info.last_error.clone().unwrap_or_default())),
                TaskState::UpstreamFailed => summary.upstream_failed.push(id.clone()),
                TaskState::Pending | TaskState::Running => {}
            }
        }

        summary
    }
}

/// Applies state transitions to one [`DagRun`].
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    run: &'a mut DagRun,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a TaskGraph, run: &'a mut DagRun) -> Self {
        Self { graph, run }
    }

    pub fn deps_satisfied(&self, task: &str) -> bool {
        self.run.deps_satisfied(self.graph, task)
    }

    /// Move every `Pending` task whose upstream tasks all succeeded to
    /// `Running` and return them as first attempts.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        // Decide first, then mutate to avoid borrowing issues.
        let candidates: Vec<TaskId> = self
            .graph
            .topological_order()
            .iter()
            .filter(|id| {
                matches!(
                    self.run.tasks.get(*id).map(|i| i.state),
                    Some(TaskState::Pending)
                ) && self.deps_satisfied(id.as_str())
            })
            .cloned()
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(info) = self.run.tasks.get_mut(&id) {
                info.state = TaskState::Running;
                info.attempts = 1;
                info!(
                    task = %id,
                    run_id = self.run.run_id,
                    "upstream tasks succeeded; scheduling task"
                );
                ready.push(ScheduledTask {
                    run_id: self.run.run_id,
                    task: id,
                    logical_date: self.run.logical_date,
                    attempt: 1,
                    delay: Duration::ZERO,
                });
            }
        }

        ready
    }

    /// Mark every direct and transitive downstream task of `failed_task` that
    /// has not started yet as `UpstreamFailed`.
    ///
    /// Returns the newly skipped tasks (excluding `failed_task` itself).
    pub fn mark_downstream_upstream_failed(&mut self, failed_task: &str) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.graph.downstream_of(failed_task).cloned().collect();
        let mut skipped = Vec::new();

        while let Some(id) = stack.pop() {
            let Some(info) = self.run.tasks.get_mut(&id) else {
                continue;
            };

            if info.state == TaskState::Pending {
                info.state = TaskState::UpstreamFailed;
                debug!(
                    task = %id,
                    run_id = self.run.run_id,
                    upstream = failed_task,
                    "marking task UpstreamFailed"
                );
                stack.extend(self.graph.downstream_of(id.as_str()).cloned());
                skipped.push(id);
            }
        }

        skipped
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.run.tasks.values().all(|info| info.state.is_terminal())
    }
}
