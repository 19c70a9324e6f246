// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::dag::{RunSummary, ScheduledTask, Scheduler};
use crate::engine::queue::RunQueue;
use crate::engine::{TaskOutcome, TriggerReason};
use crate::types::RunId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// A run reached a terminal state.
    RunFinished(RunSummary),
    /// Request that the process exits (all work done, nothing more to come).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn keep(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Handle a run request.
///
/// - A date that is already running or queued is ignored.
/// - Below `max_active_runs` the run starts immediately.
/// - Otherwise the request waits in the queue.
pub fn handle_run_request(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    max_active_runs: usize,
    logical_date: DateTime<Utc>,
    reason: TriggerReason,
) -> CoreStep {
    if scheduler.is_active(logical_date) || queue.contains(logical_date) {
        debug!(%logical_date, ?reason, "run already active or queued; ignoring request");
        return CoreStep::keep(Vec::new());
    }

    if scheduler.active_runs() >= max_active_runs {
        info!(
            %logical_date,
            active = scheduler.active_runs(),
            max_active_runs,
            "max_active_runs reached; queueing run"
        );
        queue.record_request(logical_date);
        return CoreStep::keep(Vec::new());
    }

    debug!(%logical_date, ?reason, "starting run");
    let mut commands = start_run(scheduler, logical_date);
    // An empty graph finishes on start, which frees the slot again.
    commands.extend(start_queued_runs(scheduler, queue, max_active_runs));
    CoreStep::keep(commands)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    max_active_runs: usize,
    run_id: RunId,
    task: &str,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(run_id, task, outcome);

    let mut commands = Vec::new();
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if let Some(summary) = step.finished_run {
        commands.push(CoreCommand::RunFinished(summary));
        commands.extend(start_queued_runs(scheduler, queue, max_active_runs));
    }

    CoreStep::keep(commands)
}

/// Start a run and translate its first scheduler step into commands.
fn start_run(scheduler: &mut Scheduler, logical_date: DateTime<Utc>) -> Vec<CoreCommand> {
    let step = scheduler.start_run(logical_date);

    let mut commands = Vec::new();
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if let Some(summary) = step.finished_run {
        commands.push(CoreCommand::RunFinished(summary));
    }
    commands
}

/// Start queued runs while there is a free slot.
fn start_queued_runs(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    max_active_runs: usize,
) -> Vec<CoreCommand> {
    let mut commands = Vec::new();

    while scheduler.active_runs() < max_active_runs {
        let Some(logical_date) = queue.pop_next() else {
            break;
        };
        debug!(%logical_date, remaining = queue.len(), "starting queued run");
        commands.extend(start_run(scheduler, logical_date));
    }

    commands
}
