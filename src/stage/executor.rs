// src/stage/executor.rs

//! The adapter between one scheduled task and the pipeline runner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::Result;
use crate::pipeline::{PipelineRunner, RunContext, SessionGuard};
use crate::types::{RunId, StageBinding, TaskId};

/// Metadata the scheduler hands to every invocation.
///
/// Only used for logging; it never changes what gets executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub run_id: RunId,
    pub logical_date: DateTime<Utc>,
    pub task_id: TaskId,
    /// 1-based attempt number within the run.
    pub attempt: u32,
}

/// Executes a fixed set of stages in a freshly opened run context.
///
/// All values are captured at construction; [`StageExecutor::execute`] takes
/// nothing but the scheduler's invocation metadata.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    package: String,
    stages: StageBinding,
    context: Arc<RunContext>,
    runner: Arc<dyn PipelineRunner>,
}

impl StageExecutor {
    pub fn new(
        package: impl Into<String>,
        stages: StageBinding,
        context: Arc<RunContext>,
        runner: Arc<dyn PipelineRunner>,
    ) -> Self {
        Self {
            package: package.into(),
            stages,
            context,
            runner,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn stages(&self) -> &StageBinding {
        &self.stages
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Run the bound stages once.
    ///
    /// 1. register the package with the runner (idempotent)
    /// 2. open a run context, closed again on every exit path
    /// 3. ask the runner for exactly the bound stages
    ///
    /// Errors from any step are returned untouched; retrying is the
    /// scheduler's business.
    pub async fn execute(&self, invocation: &Invocation) -> Result<()> {
        debug!(
            task = %invocation.task_id,
            run_id = invocation.run_id,
            attempt = invocation.attempt,
            package = %self.package,
            "configuring pipeline package"
        );
        self.runner.configure(&self.package)?;

        let mut session = SessionGuard::open(self.runner.as_ref(), &self.context)?;

        info!(
            task = %invocation.task_id,
            run_id = invocation.run_id,
            attempt = invocation.attempt,
            logical_date = %invocation.logical_date,
            pipeline = %self.context.pipeline_name,
            stages = %self.stages,
            "executing stages"
        );

        session
            .run(&self.context.pipeline_name, self.stages.as_slice())
            .await
    }
}
