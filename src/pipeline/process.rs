// src/pipeline/process.rs

//! Pipeline runner that drives the project's command-line interface.
//!
//! Every `run` spawns one child process inside the project directory:
//!
//! ```text
//! <program> <args...> --pipeline <name> --nodes <a,b> --env <env> [--conf-source <src>]
//! ```
//!
//! stdout is logged at `info`, stderr at `debug`. The tail of stderr is kept
//! and attached to the error when the process exits unsuccessfully.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{LazyLock, OnceLock};

use anyhow::Context;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{BoxFuture, PipelineRunner, RunContext, Session};
use crate::errors::{Result, StagedagError};
use crate::types::StageName;

/// Environment variable through which the package identifier reaches the child.
pub const PACKAGE_ENV_VAR: &str = "STAGEDAG_PACKAGE";

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

static PACKAGE_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Whether `package` is a valid package identifier (`^[A-Za-z_][A-Za-z0-9_]*$`).
pub fn is_valid_package(package: &str) -> bool {
    PACKAGE_SYNTAX.is_match(package)
}

/// Runs stages by spawning the pipeline CLI.
#[derive(Debug)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    package: OnceLock<String>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            package: OnceLock::new(),
        }
    }

    /// The package this runner was configured for, if any.
    pub fn package(&self) -> Option<&str> {
        self.package.get().map(String::as_str)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new("kedro", vec!["run".to_string()])
    }
}

impl PipelineRunner for ProcessRunner {
    fn configure(&self, package: &str) -> Result<()> {
        if !is_valid_package(package) {
            return Err(StagedagError::ConfigError(format!(
                "invalid package identifier '{package}'"
            )));
        }

        let registered = self.package.get_or_init(|| {
            debug!(package, "registering pipeline package");
            package.to_string()
        });

        if registered != package {
            return Err(StagedagError::ConfigError(format!(
                "runner already configured for package '{registered}', cannot switch to '{package}'"
            )));
        }

        Ok(())
    }

    fn open_session(&self, context: &RunContext) -> Result<Box<dyn Session>> {
        let project = &context.project_path;
        if !project.is_dir() {
            return Err(StagedagError::ContextError {
                project: project.clone(),
                reason: "project path is not a directory".to_string(),
            });
        }

        let config_source = match &context.config_source {
            Some(src) => {
                let resolved = resolve_against(project, src);
                if !resolved.exists() {
                    return Err(StagedagError::ContextError {
                        project: project.clone(),
                        reason: format!("config source {:?} does not exist", resolved),
                    });
                }
                Some(resolved)
            }
            None => None,
        };

        Ok(Box::new(ProcessSession {
            program: self.program.clone(),
            args: self.args.clone(),
            package: self.package.get().cloned(),
            project_path: project.clone(),
            environment: context.environment.clone(),
            config_source,
            child: None,
        }))
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// One open run context backed by at most one child process at a time.
struct ProcessSession {
    program: String,
    args: Vec<String>,
    package: Option<String>,
    project_path: PathBuf,
    environment: String,
    config_source: Option<PathBuf>,
    child: Option<Child>,
}

impl ProcessSession {
    fn command(&self, pipeline_name: &str, stages: &[StageName]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--pipeline")
            .arg(pipeline_name)
            .arg("--nodes")
            .arg(stages.join(","))
            .arg("--env")
            .arg(&self.environment);

        if let Some(src) = &self.config_source {
            cmd.arg("--conf-source").arg(src);
        }
        if let Some(package) = &self.package {
            cmd.env(PACKAGE_ENV_VAR, package);
        }

        cmd.current_dir(&self.project_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run_inner(&mut self, pipeline_name: &str, stages: &[StageName]) -> Result<()> {
        let mut cmd = self.command(pipeline_name, stages);

        info!(
            program = %self.program,
            pipeline = %pipeline_name,
            stages = ?stages,
            env = %self.environment,
            "starting stage process"
        );

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}' for stages {:?}", self.program, stages))?;

        if let Some(stdout) = child.stdout.take() {
            let label = stages.join(",");
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(stages = %label, "stdout: {}", line);
                }
            });
        }

        let stderr_tail = child.stderr.take().map(|stderr| {
            let label = stages.join(",");
            tokio::spawn(async move {
                let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(stages = %label, "stderr: {}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        // Keep the child on the session so `close` can kill it if this future
        // is dropped before the process exits.
        let child = self.child.insert(child);
        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for stage process {:?}", stages))?;
        self.child = None;

        let code = status.code().unwrap_or(-1);
        info!(
            stages = ?stages,
            exit_code = code,
            success = status.success(),
            "stage process exited"
        );

        if status.success() {
            return Ok(());
        }

        let tail = match stderr_tail {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let mut reason = format!("process exited with code {code}");
        if !tail.is_empty() {
            reason.push_str(":\n");
            reason.push_str(&tail.join("\n"));
        }

        Err(StagedagError::StageFailed {
            stages: stages.to_vec(),
            reason,
        })
    }
}

impl Session for ProcessSession {
    fn run<'a>(
        &'a mut self,
        pipeline_name: &'a str,
        stages: &'a [StageName],
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run_inner(pipeline_name, stages))
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!(
                project = ?self.project_path,
                "run context closed while stage process still running; killing it"
            );
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "stage process already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_is_idempotent_for_same_package() {
        let runner = ProcessRunner::default();
        runner.configure("spaceflights").unwrap();
        runner.configure("spaceflights").unwrap();
        assert_eq!(runner.package(), Some("spaceflights"));
    }

    #[test]
    fn configure_rejects_switching_or_bad_identifiers() {
        let runner = ProcessRunner::default();
        runner.configure("first").unwrap();
        assert!(runner.configure("second").is_err());

        let fresh = ProcessRunner::default();
        assert!(fresh.configure("not-a-package").is_err());
        assert!(fresh.configure("").is_err());
        assert_eq!(fresh.package(), None);
    }

    #[test]
    fn open_session_requires_project_directory() {
        let runner = ProcessRunner::default();
        let ctx = RunContext::new("/definitely/not/here", "local");
        assert!(matches!(
            runner.open_session(&ctx).err(),
            Some(StagedagError::ContextError { .. })
        ));
    }

    #[test]
    fn open_session_requires_existing_config_source() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::default();

        let ctx = RunContext::new(dir.path(), "local").with_config_source("conf");
        assert!(runner.open_session(&ctx).is_err());

        std::fs::create_dir(dir.path().join("conf")).unwrap();
        assert!(runner.open_session(&ctx).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_passes_stages_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(
            "sh",
            vec![
                "-c".to_string(),
                // $0 is "--pipeline"; fail when the node list mentions "bad".
                r#"case "$*" in *bad*) echo "stage blew up" >&2; exit 3;; esac; exit 0"#
                    .to_string(),
            ],
        );
        let ctx = RunContext::new(dir.path(), "local");

        let mut ok = runner.open_session(&ctx).unwrap();
        ok.run("__default__", &["good_node".to_string()]).await.unwrap();
        ok.close();

        let mut failing = runner.open_session(&ctx).unwrap();
        let err = failing
            .run("__default__", &["bad_node".to_string()])
            .await
            .unwrap_err();
        failing.close();

        match err {
            StagedagError::StageFailed { stages, reason } => {
                assert_eq!(stages, vec!["bad_node".to_string()]);
                assert!(reason.contains("code 3"));
                assert!(reason.contains("stage blew up"));
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
    }

    /// `/proc/<pid>` is gone or the process is a zombie awaiting reaping.
    #[cfg(target_os = "linux")]
    fn process_ended(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with(['Z', 'X'])),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancelled_invocation_kills_the_stage_process() {
        use std::sync::Arc;
        use std::time::Duration;

        use chrono::Utc;

        use crate::stage::{Invocation, StageExecutor};
        use crate::types::{StageBinding, TaskId};

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let runner = Arc::new(ProcessRunner::new(
            "sh",
            vec!["-c".to_string(), "echo $$ > pid; exec sleep 30".to_string()],
        ));
        let executor = StageExecutor::new(
            "spaceflights",
            StageBinding::single("train_model").unwrap(),
            Arc::new(RunContext::new(dir.path(), "local")),
            runner,
        );
        let invocation = Invocation {
            run_id: 1,
            logical_date: Utc::now(),
            task_id: TaskId::parse("train-model").unwrap(),
            attempt: 1,
        };

        let task = tokio::spawn(async move { executor.execute(&invocation).await });

        let pid = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(pid) = std::fs::read_to_string(&pid_file) {
                    if !pid.trim().is_empty() {
                        return pid.trim().to_string();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stage process should start");
        assert!(!process_ended(&pid), "stage process should be running");

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !process_ended(&pid) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stage process should be killed when its context closes");
    }
}
