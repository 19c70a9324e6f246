// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`].
//!
//! - `RealExecutorBackend` is the default implementation used by `stagedag`.
//!   It wraps the executor loop and forwards scheduled tasks over an mpsc
//!   channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.
//!
//! [`executor_loop`]: super::executor_loop

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::dag::{ScheduledTask, TaskGraph};
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};

use super::executor_loop::spawn_executor;

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't run real stages.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// The implementation is free to:
    /// - invoke stage executors (production)
    /// - simulate completion and emit `RuntimeEvent`s (tests)
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stop accepting work and cancel whatever is still running.
    ///
    /// Resolves once cancelled invocations have released their resources.
    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Real executor backend used in production.
///
/// Internally, this wraps the executor loop in [`spawn_executor`]. The runtime
/// calls `spawn_ready_tasks`, which forwards the tasks to the background
/// executor via an mpsc channel.
pub struct RealExecutorBackend {
    tx: Option<mpsc::Sender<ScheduledTask>>,
    handle: Option<JoinHandle<()>>,
}

impl RealExecutorBackend {
    /// Create a new real executor backend for `graph`, wiring it to the given
    /// runtime event sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(graph: Arc<TaskGraph>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let (tx, handle) = spawn_executor(graph, runtime_tx);
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            let Some(tx) = tx else {
                debug!(count = tasks.len(), "executor already shut down; dropping tasks");
                return Ok(());
            };
            for task in tasks {
                tx.send(task).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        // Closing the channel makes the loop cancel its running tasks.
        self.tx.take();
        let handle = self.handle.take();

        Box::pin(async move {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    debug!(error = %e, "executor loop ended abnormally");
                }
            }
        })
    }
}
