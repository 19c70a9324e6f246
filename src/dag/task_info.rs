// src/dag/task_info.rs

//! Per-run task state and the dispatch descriptor handed to executors.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{RunId, TaskId};

/// State of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for upstream tasks.
    Pending,
    /// Dispatched to the executor (including while waiting to be retried).
    Running,
    Succeeded,
    /// Failed with no retries left.
    Failed,
    /// Never started because an upstream task failed.
    UpstreamFailed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::UpstreamFailed
        )
    }
}

/// Mutable per-run bookkeeping for one task.
#[derive(Debug, Clone)]
pub struct TaskRunInfo {
    pub state: TaskState,
    /// Number of attempts dispatched so far in this run.
    pub attempts: u32,
    /// Error reported by the most recent failed attempt.
    pub last_error: Option<String>,
}

impl Default for TaskRunInfo {
    fn default() -> Self {
        Self {
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// A task the scheduler wants executed now (or after `delay`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub run_id: RunId,
    pub task: TaskId,
    pub logical_date: DateTime<Utc>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// How long to wait before invoking; non-zero only for retries.
    pub delay: Duration,
}
