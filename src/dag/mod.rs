// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`graph`] holds the immutable graph of task nodes and edges.
//! - [`builder`] declares nodes and dependencies and checks acyclicity.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready, retried, or skipped.
//! - [`task_info`] provides per-run task state and dispatch descriptors.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod builder;
pub mod graph;
pub mod retry;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use builder::TaskGraphBuilder;
pub use graph::{TaskGraph, TaskNode};
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use scheduler_step::{RunSummary, SchedulerStep};
pub use state_manager::DagRun;
pub use task_info::{ScheduledTask, TaskState};
