// src/pipeline/mod.rs

//! Boundary with the pipeline runner.
//!
//! The runner is the service that knows how to load a pipeline project and
//! execute its stages by name. This crate only talks to it through two traits:
//!
//! - [`PipelineRunner`]: process-wide package registration plus run-context
//!   acquisition.
//! - [`Session`]: an open run context that executes named stages and must be
//!   closed afterwards.
//!
//! [`SessionGuard`] owns an open session and closes it exactly once when it
//! goes out of scope, whether the stage call returned, failed, or the
//! surrounding future was dropped by a cancelled task.
//!
//! [`process`] provides the production runner that shells out to the
//! pipeline's command-line interface.

use std::fmt::Debug;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::pin::Pin;

use tracing::debug;

use crate::errors::Result;
use crate::types::StageName;

pub mod process;

pub use process::{is_valid_package, ProcessRunner};

/// Boxed future used at the trait seams (keeps the traits object safe).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pipeline name meaning "the whole registered pipeline".
pub const DEFAULT_PIPELINE: &str = "__default__";

/// Static description of where and how stages run.
///
/// Built once from configuration and shared read-only by every task of a
/// graph. Sessions are opened from it fresh on every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Filesystem location of the pipeline project.
    pub project_path: PathBuf,
    /// Named configuration profile (e.g. `"production"`).
    pub environment: String,
    /// Configuration override location; `None` means the runner's default.
    pub config_source: Option<PathBuf>,
    /// Which registered pipeline to draw stages from.
    pub pipeline_name: String,
}

impl RunContext {
    pub fn new(project_path: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            environment: environment.into(),
            config_source: None,
            pipeline_name: DEFAULT_PIPELINE.to_string(),
        }
    }

    /// Set the configuration source. An empty path means "runner default".
    pub fn with_config_source(mut self, source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        self.config_source = if source.as_os_str().is_empty() {
            None
        } else {
            Some(source)
        };
        self
    }

    pub fn with_pipeline(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }
}

/// The pipeline runner as seen from a scheduled task.
pub trait PipelineRunner: Send + Sync + Debug {
    /// Register the project package so stage names can be resolved.
    ///
    /// Must be idempotent and safe to call concurrently from any number of
    /// invocations.
    fn configure(&self, package: &str) -> Result<()>;

    /// Acquire a fresh run context.
    ///
    /// On error nothing is left open; implementations release whatever they
    /// acquired before failing.
    fn open_session(&self, context: &RunContext) -> Result<Box<dyn Session>>;
}

/// An open run context.
pub trait Session: Send {
    /// Execute exactly the given stages, in order, within this context.
    fn run<'a>(
        &'a mut self,
        pipeline_name: &'a str,
        stages: &'a [StageName],
    ) -> BoxFuture<'a, Result<()>>;

    /// Release everything held by the context.
    ///
    /// Called exactly once by [`SessionGuard`].
    fn close(&mut self);
}

/// Scoped ownership of a [`Session`].
pub struct SessionGuard {
    session: Box<dyn Session>,
}

impl SessionGuard {
    /// Open a session through `runner`; acquisition errors are returned as is.
    pub fn open(runner: &dyn PipelineRunner, context: &RunContext) -> Result<Self> {
        let session = runner.open_session(context)?;
        debug!(project = ?context.project_path, env = %context.environment, "run context opened");
        Ok(Self { session })
    }
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
        debug!("run context closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::errors::StagedagError;

    #[derive(Debug, Default)]
    struct CountingRunner {
        closes: Arc<AtomicUsize>,
        fail_open: bool,
    }

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    impl Session for CountingSession {
        fn run<'a>(
            &'a mut self,
            _pipeline_name: &'a str,
            stages: &'a [StageName],
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                Err(StagedagError::StageFailed {
                    stages: stages.to_vec(),
                    reason: "boom".into(),
                })
            })
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl PipelineRunner for CountingRunner {
        fn configure(&self, _package: &str) -> Result<()> {
            Ok(())
        }

        fn open_session(&self, context: &RunContext) -> Result<Box<dyn Session>> {
            if self.fail_open {
                return Err(StagedagError::ContextError {
                    project: context.project_path.clone(),
                    reason: "missing".into(),
                });
            }
            Ok(Box::new(CountingSession {
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    #[test]
    fn empty_config_source_means_default() {
        let ctx = RunContext::new("/p", "local").with_config_source("");
        assert_eq!(ctx.config_source, None);

        let ctx = RunContext::new("/p", "local").with_config_source("conf");
        assert_eq!(ctx.config_source, Some(PathBuf::from("conf")));
        assert_eq!(ctx.pipeline_name, DEFAULT_PIPELINE);
    }

    #[tokio::test]
    async fn guard_closes_once_even_when_run_fails() {
        let runner = CountingRunner::default();
        let ctx = RunContext::new("/p", "local");

        {
            let mut guard = SessionGuard::open(&runner, &ctx).unwrap();
            let stages = vec!["a".to_string()];
            assert!(guard.run(DEFAULT_PIPELINE, &stages).await.is_err());
        }

        assert_eq!(runner.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_open_returns_error_and_closes_nothing() {
        let runner = CountingRunner {
            fail_open: true,
            ..Default::default()
        };
        let ctx = RunContext::new("/missing", "local");

        let err = SessionGuard::open(&runner, &ctx).err().unwrap();
        assert!(matches!(err, StagedagError::ContextError { .. }));
        assert_eq!(runner.closes.load(Ordering::SeqCst), 0);
    }
}
