// src/dag/scheduler_step.rs

//! Step-by-step result types for the scheduler.

use chrono::{DateTime, Utc};

use crate::dag::task_info::ScheduledTask;
use crate::types::{RunId, TaskId};

/// Structured result of a single scheduler "step".
///
/// Tests use this to drive the DAG by hand and assert on what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Run the step applied to, if any.
    pub run_id: Option<RunId>,
    /// Tasks that became ready (or are being retried) as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that failed for good in this step.
    pub newly_failed: Vec<TaskId>,
    /// Tasks skipped because of an upstream failure in this step.
    pub newly_upstream_failed: Vec<TaskId>,
    /// Set when this step completed the run.
    pub finished_run: Option<RunSummary>,
}

/// Outcome of a finished run, kept as run history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub logical_date: DateTime<Utc>,
    pub succeeded: Vec<TaskId>,
    pub failed: Vec<(TaskId, String)>,
    pub upstream_failed: Vec<TaskId>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.upstream_failed.is_empty()
    }
}
