// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually invoking the [`StageExecutor`] of
//! every scheduled task on its own Tokio task, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main executor loop which tracks running tasks.
//! - [`task_runner`] handles a single attempt: retry delay, invocation,
//!   completion event.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.
//!
//! [`StageExecutor`]: crate::stage::StageExecutor

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
