use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::{RunSummary, SchedulerStep};
use crate::dag::state_manager::{DagRun, StateManager};
use crate::dag::task_info::{ScheduledTask, TaskState};
use crate::engine::TaskOutcome;
use crate::types::RunId;

/// Scheduler holds the immutable task graph plus the state of every active run.
///
/// It is responsible for:
/// - starting runs (every task `Pending`)
/// - deciding when a task is ready (all upstream tasks `Succeeded`)
/// - retrying failed attempts according to the task's retry policy
/// - skipping downstream tasks once a task has failed for good
/// - recording a summary when a run finishes
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    runs: BTreeMap<RunId, DagRun>,
    /// Monotonically increasing run ID.
    run_counter: RunId,
    history: Vec<RunSummary>,
}

impl Scheduler {
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        Self {
            graph,
            runs: BTreeMap::new(),
            run_counter: 0,
            history: Vec::new(),
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Returns `true` if there is no active run.
    pub fn is_idle(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    /// Ids of the runs that have not finished yet.
    pub fn active_run_ids(&self) -> Vec<RunId> {
        self.runs.keys().copied().collect()
    }

    /// Whether a run for `logical_date` is still active.
    pub fn is_active(&self, logical_date: DateTime<Utc>) -> bool {
        self.runs.values().any(|r| r.logical_date == logical_date)
    }

    /// State of `task` in an active run.
    pub fn state_of(&self, run_id: RunId, task: &str) -> Option<TaskState> {
        self.runs.get(&run_id)?.state_of(task)
    }

    /// Attempts dispatched so far for `task` in an active run.
    pub fn attempts_of(&self, run_id: RunId, task: &str) -> Option<u32> {
        Some(self.runs.get(&run_id)?.tasks.get(task)?.attempts)
    }

    /// Whether the dependencies of `task` are satisfied in an active run.
    ///
    /// Returns `None` if the run or task is unknown.
    pub fn deps_satisfied(&self, run_id: RunId, task: &str) -> Option<bool> {
        if !self.graph.contains(task) {
            return None;
        }
        let run = self.runs.get(&run_id)?;
        Some(run.deps_satisfied(&self.graph, task))
    }

    /// Summaries of finished runs, oldest first.
    pub fn history(&self) -> &[RunSummary] {
        &self.history
    }

    /// Start a run for `logical_date` and return its first ready tasks.
    pub fn start_run(&mut self, logical_date: DateTime<Utc>) -> SchedulerStep {
        self.run_counter += 1;
        let run_id = self.run_counter;
        let graph = Arc::clone(&self.graph);

        let mut run = DagRun::new(run_id, logical_date, &graph);
        let newly_scheduled = StateManager::new(&graph, &mut run).collect_new_ready_tasks();
        self.runs.insert(run_id, run);

        info!(run_id, %logical_date, tasks = graph.len(), "scheduler: starting new DAG run");

        let finished_run = self.maybe_finish_run(run_id);
        SchedulerStep {
            run_id: Some(run_id),
            newly_scheduled,
            finished_run,
            ..SchedulerStep::default()
        }
    }

    /// Handle completion of a task attempt (production API).
    pub fn handle_completion(
        &mut self,
        run_id: RunId,
        task: &str,
        outcome: TaskOutcome,
    ) -> Vec<ScheduledTask> {
        self.step_completion(run_id, task, outcome).newly_scheduled
    }

    /// Handle completion of a task attempt and report everything that changed.
    pub fn step_completion(
        &mut self,
        run_id: RunId,
        task: &str,
        outcome: TaskOutcome,
    ) -> SchedulerStep {
        let mut step = SchedulerStep {
            run_id: Some(run_id),
            ..SchedulerStep::default()
        };

        let graph = Arc::clone(&self.graph);
        let Some(node) = graph.node(task) else {
            warn!(task = %task, run_id, "completion for unknown task; ignoring");
            return step;
        };
        let Some(run) = self.runs.get_mut(&run_id) else {
            warn!(task = %task, run_id, "completion for inactive run; ignoring");
            return step;
        };
        let Some(info) = run.tasks.get_mut(task) else {
            return step;
        };
        if info.state != TaskState::Running {
            warn!(
                task = %task,
                run_id,
                state = ?info.state,
                "completion for task that is not running; ignoring"
            );
            return step;
        }

        match outcome {
            TaskOutcome::Success => {
                info.state = TaskState::Succeeded;
                debug!(task = %task, run_id, attempt = info.attempts, "task succeeded");
                step.newly_scheduled = StateManager::new(&graph, run).collect_new_ready_tasks();
            }
            TaskOutcome::Failed(error) => {
                let retry = node.retry();
                let attempt = info.attempts;
                info.last_error = Some(error.clone());

                if retry.should_retry(attempt) {
                    info.attempts += 1;
                    warn!(
                        task = %task,
                        run_id,
                        attempt,
                        retries = retry.retries,
                        delay = ?retry.retry_delay,
                        error = %error,
                        "task attempt failed; retrying"
                    );
                    step.newly_scheduled.push(ScheduledTask {
                        run_id,
                        task: node.id().clone(),
                        logical_date: run.logical_date,
                        attempt: info.attempts,
                        delay: retry.retry_delay,
                    });
                } else {
                    info.state = TaskState::Failed;
                    warn!(
                        task = %task,
                        run_id,
                        attempt,
                        error = %error,
                        "task failed; skipping downstream tasks in this run"
                    );
                    step.newly_failed.push(node.id().clone());
                    step.newly_upstream_failed =
                        StateManager::new(&graph, run).mark_downstream_upstream_failed(task);
                }
            }
        }

        step.finished_run = self.maybe_finish_run(run_id);
        step
    }

    /// Drop a run once every task is terminal and record its summary.
    fn maybe_finish_run(&mut self, run_id: RunId) -> Option<RunSummary> {
        let graph = Arc::clone(&self.graph);
        let run = self.runs.get_mut(&run_id)?;

        if !StateManager::new(&graph, run).all_tasks_terminal() {
            return None;
        }

        let summary = self.runs.remove(&run_id)?.summary();
        if summary.is_success() {
            info!(
                run_id,
                succeeded = summary.succeeded.len(),
                "scheduler: run finished successfully"
            );
        } else {
            warn!(
                run_id,
                succeeded = summary.succeeded.len(),
                failed = summary.failed.len(),
                upstream_failed = summary.upstream_failed.len(),
                "scheduler: run finished with failures"
            );
        }

        self.history.push(summary.clone());
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::RetryPolicy;
    use crate::stage::testing::graph_from_table;
    use crate::stage::DependencyTable;
    use std::time::Duration;

    fn chain(retry: RetryPolicy) -> Arc<TaskGraph> {
        let table = DependencyTable::new().edge("a", "b").edge("b", "c");
        Arc::new(graph_from_table(&table, retry))
    }

    fn names(tasks: &[ScheduledTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.task.as_str()).collect()
    }

    #[test]
    fn chain_runs_in_order_and_finishes() {
        let mut s = Scheduler::new(chain(RetryPolicy::none()));
        let step = s.start_run(Utc::now());
        let run = step.run_id.unwrap();
        assert_eq!(names(&step.newly_scheduled), vec!["a"]);
        assert_eq!(s.state_of(run, "b"), Some(TaskState::Pending));

        assert_eq!(names(&s.handle_completion(run, "a", TaskOutcome::Success)), vec!["b"]);
        assert_eq!(names(&s.handle_completion(run, "b", TaskOutcome::Success)), vec!["c"]);

        let last = s.step_completion(run, "c", TaskOutcome::Success);
        let summary = last.finished_run.expect("run should finish");
        assert!(summary.is_success());
        assert_eq!(summary.succeeded.len(), 3);
        assert!(s.is_idle());
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn failure_skips_all_downstream_tasks() {
        let mut s = Scheduler::new(chain(RetryPolicy::none()));
        let run = s.start_run(Utc::now()).run_id.unwrap();

        let step = s.step_completion(run, "a", TaskOutcome::Failed("boom".into()));
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(step.newly_failed.len(), 1);
        let mut skipped: Vec<&str> =
            step.newly_upstream_failed.iter().map(|t| t.as_str()).collect();
        skipped.sort();
        assert_eq!(skipped, vec!["b", "c"]);

        let summary = step.finished_run.expect("run should finish");
        assert_eq!(summary.failed[0].1, "boom");
        assert!(!summary.is_success());
    }

    #[test]
    fn failed_attempt_is_retried_with_delay() {
        let retry = RetryPolicy::new(1, Duration::from_secs(30));
        let mut s = Scheduler::new(chain(retry));
        let run = s.start_run(Utc::now()).run_id.unwrap();

        let retried = s.handle_completion(run, "a", TaskOutcome::Failed("flaky".into()));
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].attempt, 2);
        assert_eq!(retried[0].delay, Duration::from_secs(30));
        assert_eq!(s.state_of(run, "a"), Some(TaskState::Running));
        assert_eq!(s.attempts_of(run, "a"), Some(2));

        let step = s.step_completion(run, "a", TaskOutcome::Failed("still".into()));
        assert_eq!(step.newly_failed.len(), 1);
        assert_eq!(step.newly_upstream_failed.len(), 2);
    }

    #[test]
    fn runs_are_independent() {
        let mut s = Scheduler::new(chain(RetryPolicy::none()));
        let first = s.start_run(Utc::now()).run_id.unwrap();
        let second = s.start_run(Utc::now()).run_id.unwrap();
        assert_eq!(s.active_runs(), 2);

        s.handle_completion(first, "a", TaskOutcome::Failed("x".into()));
        assert!(s.state_of(first, "b").is_none(), "first run finished");

        let next = s.handle_completion(second, "a", TaskOutcome::Success);
        assert_eq!(names(&next), vec!["b"]);
        assert_eq!(s.active_run_ids(), vec![second]);
    }

    #[test]
    fn stray_completions_are_ignored() {
        let mut s = Scheduler::new(chain(RetryPolicy::none()));
        let run = s.start_run(Utc::now()).run_id.unwrap();

        assert!(s.handle_completion(run, "b", TaskOutcome::Success).is_empty());
        assert!(s.handle_completion(run, "zzz", TaskOutcome::Success).is_empty());
        assert!(s.handle_completion(99, "a", TaskOutcome::Success).is_empty());
        assert_eq!(s.state_of(run, "b"), Some(TaskState::Pending));
    }

    #[test]
    fn empty_graph_finishes_immediately() {
        let graph = Arc::new(graph_from_table(&DependencyTable::new(), RetryPolicy::none()));
        let mut s = Scheduler::new(graph);
        let step = s.start_run(Utc::now());
        assert!(step.finished_run.is_some());
        assert!(s.is_idle());
    }
}
