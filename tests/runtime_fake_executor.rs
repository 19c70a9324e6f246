// tests/runtime_fake_executor.rs

mod common;
use crate::common::{assemble, day};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use stagedag::dag::{RetryPolicy, RunSummary, Scheduler, TaskGraph};
use stagedag::engine::{CoreRuntime, Runtime, RuntimeEvent, TriggerReason};
use stagedag::stage::DependencyTable;
use stagedag_test_utils::{init_tracing, with_timeout, FakeExecutor, FakeRunner};

type Executed = Arc<Mutex<Vec<(String, u32)>>>;

fn chain(retry: RetryPolicy) -> TaskGraph {
    let table = DependencyTable::new().edge("extract", "transform").edge("transform", "load");
    assemble(&table, &Arc::new(FakeRunner::new()), retry)
}

async fn drive(
    graph: TaskGraph,
    dates: &[DateTime<Utc>],
    max_active_runs: usize,
    failing: Option<&str>,
) -> (Vec<RunSummary>, Vec<(String, u32)>) {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed: Executed = Arc::new(Mutex::new(Vec::new()));
    let mut executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed));
    if let Some(task) = failing {
        executor = executor.failing(task);
    }

    for &logical_date in dates {
        tx.send(RuntimeEvent::RunRequested {
            logical_date,
            reason: TriggerReason::Timetable,
        })
        .await
        .unwrap();
    }
    tx.send(RuntimeEvent::TimetableExhausted).await.unwrap();

    let core = CoreRuntime::new(Scheduler::new(Arc::new(graph)), max_active_runs);
    let summaries = with_timeout(Runtime::new(core, rx, executor).run())
        .await
        .expect("runtime should finish");

    let executed = executed.lock().unwrap().clone();
    (summaries, executed)
}

fn names(executed: &[(String, u32)]) -> Vec<&str> {
    executed.iter().map(|(t, _)| t.as_str()).collect()
}

#[tokio::test]
async fn chain_executes_in_dependency_order() {
    let (summaries, executed) = drive(chain(RetryPolicy::none()), &[day(1)], 1, None).await;

    assert_eq!(names(&executed), vec!["extract", "transform", "load"]);
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].is_success());
    assert_eq!(summaries[0].logical_date, day(1));
}

#[tokio::test]
async fn failure_is_reported_in_the_summary() {
    let (summaries, executed) =
        drive(chain(RetryPolicy::none()), &[day(1)], 1, Some("transform")).await;

    assert_eq!(names(&executed), vec!["extract", "transform"]);

    let summary = &summaries[0];
    assert!(!summary.is_success());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0.as_str(), "transform");
    assert_eq!(summary.failed[0].1, "transform failed");
    assert_eq!(summary.upstream_failed.len(), 1);
    assert_eq!(summary.upstream_failed[0].as_str(), "load");
}

#[tokio::test]
async fn retries_are_dispatched_until_exhausted() {
    let retry = RetryPolicy::new(2, Duration::ZERO);
    let (summaries, executed) = drive(chain(retry), &[day(1)], 1, Some("transform")).await;

    assert_eq!(
        executed,
        vec![
            ("extract".to_string(), 1),
            ("transform".to_string(), 1),
            ("transform".to_string(), 2),
            ("transform".to_string(), 3),
        ]
    );
    assert!(!summaries[0].is_success());
}

#[tokio::test]
async fn run_limit_serializes_runs() {
    let (summaries, executed) =
        drive(chain(RetryPolicy::none()), &[day(1), day(2)], 1, None).await;

    // The second run starts only after the first one finished.
    assert_eq!(
        names(&executed),
        vec!["extract", "transform", "load", "extract", "transform", "load"]
    );
    let dates: Vec<_> = summaries.iter().map(|s| s.logical_date).collect();
    assert_eq!(dates, vec![day(1), day(2)]);
}

#[tokio::test]
async fn duplicate_requests_start_one_run() {
    let (summaries, executed) =
        drive(chain(RetryPolicy::none()), &[day(3), day(3)], 2, None).await;

    assert_eq!(summaries.len(), 1);
    assert_eq!(executed.len(), 3);
}
