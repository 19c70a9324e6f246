// src/exec/executor_loop.rs

//! Main executor loop that manages running task invocations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, TaskGraph};
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::exec::task_runner::run_task;
use crate::types::{RunId, TaskId};

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledTask>` is what `RealExecutorBackend`
/// uses to submit work. Each scheduled attempt is executed in its own Tokio
/// task, so unrelated tasks (and runs) execute concurrently.
///
/// When the sender side is closed the loop aborts every attempt that is
/// still running. Aborting drops the attempt's future, which closes its run
/// context, and the loop waits for that before it finishes.
pub fn spawn_executor(
    graph: Arc<TaskGraph>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> (mpsc::Sender<ScheduledTask>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    let handle = tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<(RunId, TaskId), JoinHandle<()>> = HashMap::new();

        while let Some(task) = rx.recv().await {
            active.retain(|_, handle| !handle.is_finished());
            handle_scheduled_task(task, &graph, &mut active, &runtime_tx).await;
        }

        let running: Vec<_> = active
            .into_iter()
            .filter(|(_, handle)| !handle.is_finished())
            .collect();
        if !running.is_empty() {
            info!(count = running.len(), "cancelling running tasks");
        }
        for ((run_id, task), handle) in running {
            handle.abort();
            let _ = handle.await;
            debug!(task = %task, run_id, "task cancelled");
        }

        info!("executor loop finished (channel closed)");
    });

    (tx, handle)
}

/// Handle a newly scheduled attempt.
async fn handle_scheduled_task(
    task: ScheduledTask,
    graph: &TaskGraph,
    active: &mut HashMap<(RunId, TaskId), JoinHandle<()>>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let Some(node) = graph.node(task.task.as_str()) else {
        warn!(task = %task.task, run_id = task.run_id, "scheduled task is not in the graph");
        let _ = runtime_tx
            .send(RuntimeEvent::TaskCompleted {
                run_id: task.run_id,
                task: task.task,
                outcome: TaskOutcome::Failed("task is not part of the graph".into()),
            })
            .await;
        return;
    };

    // At most one attempt per task and run is in flight; a retry replaces the
    // handle of the attempt that already reported.
    let key = (task.run_id, task.task.clone());

    let executor = node.executor().clone();
    let rt_tx = runtime_tx.clone();
    let handle = tokio::spawn(async move {
        run_task(task, executor, rt_tx).await;
    });

    active.insert(key, handle);
}
