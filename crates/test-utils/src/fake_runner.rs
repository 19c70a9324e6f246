//! In-memory pipeline runner that records every interaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use stagedag::errors::{Result, StagedagError};
use stagedag::pipeline::{BoxFuture, PipelineRunner, RunContext, Session};
use stagedag::types::StageName;

/// One `Session::run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    /// Sequence number of the session that executed it.
    pub session: usize,
    pub pipeline: String,
    pub stages: Vec<StageName>,
    pub context: RunContext,
}

#[derive(Debug, Default)]
struct State {
    configured: Vec<String>,
    open_attempts: usize,
    teardowns: usize,
    closes: usize,
    runs: Vec<RecordedRun>,
    failures_left: HashMap<String, u32>,
}

/// Pipeline runner for tests.
///
/// - counts `configure` calls, session acquisitions and teardowns
/// - records every stage execution with the session it ran in
/// - fails stages on demand (always, or the first `n` times)
/// - can fail acquisition, releasing the partially acquired context first
/// - can hang a stage forever to exercise cancellation
#[derive(Debug, Default)]
pub struct FakeRunner {
    state: Arc<Mutex<State>>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    fail_open: Option<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execution including `stage` fails.
    pub fn failing_stage(mut self, stage: &str) -> Self {
        self.failing.insert(stage.to_string());
        self
    }

    /// The first `times` executions including `stage` fail.
    pub fn failing_times(self, stage: &str, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures_left
            .insert(stage.to_string(), times);
        self
    }

    /// Executions including `stage` never finish.
    pub fn hanging_stage(mut self, stage: &str) -> Self {
        self.hanging.insert(stage.to_string());
        self
    }

    /// Every acquisition fails with `reason`.
    pub fn failing_open(mut self, reason: &str) -> Self {
        self.fail_open = Some(reason.to_string());
        self
    }

    pub fn configured(&self) -> Vec<String> {
        self.state.lock().unwrap().configured.clone()
    }

    pub fn open_attempts(&self) -> usize {
        self.state.lock().unwrap().open_attempts
    }

    /// Releases of any kind, including the one done by a failed acquisition.
    pub fn teardowns(&self) -> usize {
        self.state.lock().unwrap().teardowns
    }

    /// `Session::close` calls made by the caller.
    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.state.lock().unwrap().runs.clone()
    }

    /// Stage names in execution order.
    pub fn executed_stages(&self) -> Vec<StageName> {
        self.runs().into_iter().flat_map(|r| r.stages).collect()
    }
}

impl PipelineRunner for FakeRunner {
    fn configure(&self, package: &str) -> Result<()> {
        self.state.lock().unwrap().configured.push(package.to_string());
        Ok(())
    }

    fn open_session(&self, context: &RunContext) -> Result<Box<dyn Session>> {
        let mut state = self.state.lock().unwrap();
        state.open_attempts += 1;
        let id = state.open_attempts;

        if let Some(reason) = &self.fail_open {
            // Whatever was acquired before the failure is released here.
            state.teardowns += 1;
            return Err(StagedagError::ContextError {
                project: context.project_path.clone(),
                reason: reason.clone(),
            });
        }

        Ok(Box::new(FakeSession {
            id,
            context: context.clone(),
            state: Arc::clone(&self.state),
            failing: self.failing.clone(),
            hanging: self.hanging.clone(),
        }))
    }
}

struct FakeSession {
    id: usize,
    context: RunContext,
    state: Arc<Mutex<State>>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
}

impl Session for FakeSession {
    fn run<'a>(
        &'a mut self,
        pipeline_name: &'a str,
        stages: &'a [StageName],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let fail = {
                let mut state = self.state.lock().unwrap();
                state.runs.push(RecordedRun {
                    session: self.id,
                    pipeline: pipeline_name.to_string(),
                    stages: stages.to_vec(),
                    context: self.context.clone(),
                });

                let mut fail = stages.iter().any(|s| self.failing.contains(s));
                for stage in stages {
                    if let Some(left) = state.failures_left.get_mut(stage) {
                        if *left > 0 {
                            *left -= 1;
                            fail = true;
                        }
                    }
                }
                fail
            };

            if stages.iter().any(|s| self.hanging.contains(s)) {
                std::future::pending::<()>().await;
            }

            if fail {
                return Err(StagedagError::StageFailed {
                    stages: stages.to_vec(),
                    reason: "injected failure".to_string(),
                });
            }
            Ok(())
        })
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.teardowns += 1;
        state.closes += 1;
    }
}
