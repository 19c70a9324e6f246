// src/exec/task_runner.rs

//! Single task attempt runner.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::stage::{Invocation, StageExecutor};

/// Run one attempt of a scheduled task and report its outcome.
///
/// Waits for the retry delay first (zero for first attempts). Errors from the
/// executor become [`TaskOutcome::Failed`]; nothing is retried here.
///
/// If the surrounding Tokio task is aborted the future is dropped wherever it
/// is suspended and **no** `TaskCompleted` event is sent.
pub async fn run_task(
    task: ScheduledTask,
    executor: StageExecutor,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    if !task.delay.is_zero() {
        debug!(
            task = %task.task,
            run_id = task.run_id,
            attempt = task.attempt,
            delay = ?task.delay,
            "waiting before retry"
        );
        tokio::time::sleep(task.delay).await;
    }

    let invocation = Invocation {
        run_id: task.run_id,
        logical_date: task.logical_date,
        task_id: task.task.clone(),
        attempt: task.attempt,
    };

    info!(
        task = %task.task,
        run_id = task.run_id,
        attempt = task.attempt,
        stages = %executor.stages(),
        "starting task"
    );

    let outcome = match executor.execute(&invocation).await {
        Ok(()) => {
            info!(
                task = %task.task,
                run_id = task.run_id,
                attempt = task.attempt,
                "task attempt succeeded"
            );
            TaskOutcome::Success
        }
        Err(err) => {
            warn!(
                task = %task.task,
                run_id = task.run_id,
                attempt = task.attempt,
                error = %err,
                "task attempt failed"
            );
            TaskOutcome::Failed(err.to_string())
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            run_id: task.run_id,
            task: task.task,
            outcome,
        })
        .await
        .is_err()
    {
        debug!("runtime gone; dropping task completion");
    }
}
