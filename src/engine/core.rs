// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - handling Ctrl+C / shutdown
//!
//! The core is unit tested without any Tokio, channels, or processes.

use crate::dag::{RunSummary, Scheduler};
use crate::engine::event_handlers::{
    handle_run_request, handle_task_completion, CoreCommand, CoreStep,
};
use crate::engine::queue::RunQueue;
use crate::engine::RuntimeEvent;

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the run queue
/// - the concurrency limit and whether the timetable has more runs
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: RunQueue,
    max_active_runs: usize,
    timetable_exhausted: bool,
}

impl CoreRuntime {
    /// `max_active_runs` is clamped to at least 1.
    pub fn new(scheduler: Scheduler, max_active_runs: usize) -> Self {
        Self {
            scheduler,
            queue: RunQueue::new(),
            max_active_runs: max_active_runs.max(1),
            timetable_exhausted: false,
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Expose queue emptiness (for tests).
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queued_runs(&self) -> usize {
        self.queue.len()
    }

    pub fn active_runs(&self) -> usize {
        self.scheduler.active_runs()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Summaries of every finished run, oldest first.
    pub fn history(&self) -> &[RunSummary] {
        self.scheduler.history()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let mut step = match event {
            RuntimeEvent::RunRequested {
                logical_date,
                reason,
            } => handle_run_request(
                &mut self.scheduler,
                &mut self.queue,
                self.max_active_runs,
                logical_date,
                reason,
            ),
            RuntimeEvent::TaskCompleted {
                run_id,
                task,
                outcome,
            } => handle_task_completion(
                &mut self.scheduler,
                &mut self.queue,
                self.max_active_runs,
                run_id,
                task.as_str(),
                outcome,
            ),
            RuntimeEvent::TimetableExhausted => {
                self.timetable_exhausted = true;
                CoreStep::keep(Vec::new())
            }
            RuntimeEvent::ShutdownRequested => {
                return CoreStep {
                    commands: Vec::new(),
                    keep_running: false,
                };
            }
        };

        // Nothing left to run and nothing more will be requested.
        if self.timetable_exhausted && self.scheduler.is_idle() && self.queue.is_empty() {
            step.commands.push(CoreCommand::RequestExit);
            step.keep_running = false;
        }

        step
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Datelike, TimeZone, Utc};

    use super::*;
    use crate::dag::{RetryPolicy, ScheduledTask};
    use crate::engine::{TaskOutcome, TriggerReason};
    use crate::stage::testing::graph_from_table;
    use crate::stage::DependencyTable;

    fn core(max_active_runs: usize) -> CoreRuntime {
        let table = DependencyTable::new().edge("a", "b");
        let graph = graph_from_table(&table, RetryPolicy::none());
        CoreRuntime::new(Scheduler::new(Arc::new(graph)), max_active_runs)
    }

    fn request(day: u32) -> RuntimeEvent {
        RuntimeEvent::RunRequested {
            logical_date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            reason: TriggerReason::Timetable,
        }
    }

    fn dispatched(step: &CoreStep) -> Vec<ScheduledTask> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(t) => Some(t.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn complete(task: &ScheduledTask, outcome: TaskOutcome) -> RuntimeEvent {
        RuntimeEvent::TaskCompleted {
            run_id: task.run_id,
            task: task.task.clone(),
            outcome,
        }
    }

    #[test]
    fn runs_beyond_the_limit_are_queued() {
        let mut core = core(1);
        let first = dispatched(&core.step(request(1)));
        assert_eq!(first.len(), 1);

        assert!(dispatched(&core.step(request(2))).is_empty());
        assert_eq!(core.queued_runs(), 1);

        // Duplicate requests are ignored, queued or active.
        core.step(request(2));
        core.step(request(1));
        assert_eq!(core.queued_runs(), 1);

        let b = dispatched(&core.step(complete(&first[0], TaskOutcome::Success)));
        let step = core.step(complete(&b[0], TaskOutcome::Success));
        assert!(step
            .commands
            .iter()
            .any(|c| matches!(c, CoreCommand::RunFinished(s) if s.is_success())));

        let next = dispatched(&step);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].task.as_str(), "a");
        assert_eq!(next[0].logical_date.day0(), 1);
        assert!(core.queue_is_empty());
    }

    #[test]
    fn exits_once_exhausted_and_idle() {
        let mut core = core(3);
        let a = dispatched(&core.step(request(1)));
        let step = core.step(RuntimeEvent::TimetableExhausted);
        assert!(step.keep_running, "run still active");

        let b = dispatched(&core.step(complete(&a[0], TaskOutcome::Success)));
        let step = core.step(complete(&b[0], TaskOutcome::Failed("boom".into())));
        assert!(!step.keep_running);
        assert!(matches!(step.commands.last(), Some(CoreCommand::RequestExit)));
        assert_eq!(core.history().len(), 1);
        assert!(!core.history()[0].is_success());
    }

    #[test]
    fn shutdown_stops_immediately() {
        let mut core = core(3);
        core.step(request(1));
        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);
        assert!(!core.is_idle());
    }
}
