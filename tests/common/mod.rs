#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use stagedag::dag::{RetryPolicy, RunSummary, Scheduler, TaskGraph};
use stagedag::engine::{CoreRuntime, Runtime, RuntimeEvent, TriggerReason};
use stagedag::exec::RealExecutorBackend;
use stagedag::pipeline::{PipelineRunner, RunContext};
use stagedag::stage::{DependencyTable, GraphAssembler};
use stagedag_test_utils::{with_timeout, FakeRunner};

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

pub fn context() -> RunContext {
    RunContext::new("/srv/spaceflights", "airflow")
}

/// Assemble `table` with every task bound to `runner`.
pub fn assemble(
    table: &DependencyTable,
    runner: &Arc<FakeRunner>,
    retry: RetryPolicy,
) -> TaskGraph {
    let runner: Arc<dyn PipelineRunner> = runner.clone();
    GraphAssembler::new("spaceflights", context(), runner)
        .with_default_retry(retry)
        .assemble(table)
        .expect("table should assemble")
}

/// Drive `graph` through the real executor for the given logical dates and
/// return the finished run summaries.
pub async fn run_graph(
    graph: TaskGraph,
    dates: &[DateTime<Utc>],
    max_active_runs: usize,
) -> Vec<RunSummary> {
    let graph = Arc::new(graph);
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(Arc::clone(&graph), tx.clone());

    for &logical_date in dates {
        tx.send(RuntimeEvent::RunRequested {
            logical_date,
            reason: TriggerReason::Manual,
        })
        .await
        .unwrap();
    }
    tx.send(RuntimeEvent::TimetableExhausted).await.unwrap();

    let core = CoreRuntime::new(Scheduler::new(graph), max_active_runs);
    with_timeout(Runtime::new(core, rx, executor).run())
        .await
        .expect("runtime should finish")
}
