// src/engine/mod.rs

//! Orchestration engine for the reference scheduler.
//!
//! This module ties together:
//! - the per-run DAG scheduler
//! - the run queue (requests that arrive while `max_active_runs` is reached)
//! - the timetable ticker that requests runs
//! - the main runtime event loop that reacts to:
//!   - run requests
//!   - task completion events
//!   - timetable exhaustion
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use chrono::{DateTime, Utc};

use crate::types::{RunId, TaskId};

/// Outcome of one task attempt for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The attempt failed; carries the rendered error.
    Failed(String),
}

/// Why a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Requested by hand (e.g. `--once`).
    Manual,
    /// Due according to the graph's timetable.
    Timetable,
}

/// Events flowing into the runtime from the ticker, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A run for `logical_date` should be started (or queued).
    RunRequested {
        logical_date: DateTime<Utc>,
        reason: TriggerReason,
    },
    /// A task attempt finished with a concrete outcome.
    TaskCompleted {
        run_id: RunId,
        task: TaskId,
        outcome: TaskOutcome,
    },
    /// No further runs will be requested.
    TimetableExhausted,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;
pub mod ticker;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::RunQueue;
pub use runtime::Runtime;
pub use ticker::spawn_ticker;
