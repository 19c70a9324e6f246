// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::dag::{RetryPolicy, TaskGraph};
use crate::errors::{Result, StagedagError};
use crate::pipeline::{PipelineRunner, ProcessRunner, RunContext, DEFAULT_PIPELINE};
use crate::schedule::{Cadence, GraphMetadata, Timetable};
use crate::stage::{DependencyTable, GraphAssembler, StageOverrides};
use crate::types::{parse_duration, StageBinding, TaskId};

/// Raw configuration as read from a TOML file, before validation.
///
/// ```toml
/// [pipeline]
/// package = "spaceflights"
/// env = "airflow"
///
/// [graph]
/// schedule = "@daily"
///
/// [stage.split_data_node]
/// after = ["create_model_input_table_node"]
/// ```
///
/// Use [`ConfigFile::try_from`] (or `config::load_and_validate`) to obtain a
/// validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub runner: RunnerSection,

    #[serde(default)]
    pub graph: GraphSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// All stages from `[stage.<name>]`, keyed by stage name.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so the accessors below
/// can rely on every schedule, date and duration being well formed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub runner: RunnerSection,
    pub graph: GraphSection,
    pub default: DefaultSection,
    pub stage: BTreeMap<String, StageConfig>,
}

/// `[pipeline]` section: the run context shared by every task.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// Package identifier registered with the pipeline runner.
    pub package: String,

    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,

    /// Project location; relative paths are resolved against the config file.
    #[serde(default = "default_project_path")]
    pub project_path: PathBuf,

    #[serde(default = "default_env")]
    pub env: String,

    /// Configuration override location; empty means the runner default.
    #[serde(default)]
    pub conf_source: String,
}

/// `[runner]` section: how stages are launched.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_runner_args")]
    pub args: Vec<String>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_runner_args(),
        }
    }
}

/// `[graph]` section: scheduler-level metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSection {
    /// Graph identifier; defaults to the package name.
    #[serde(default)]
    pub id: Option<String>,

    /// RFC 3339 timestamp or `YYYY-MM-DD`; defaults to the load time.
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default = "default_schedule")]
    pub schedule: String,

    #[serde(default = "default_max_active_runs")]
    pub max_active_runs: usize,

    #[serde(default)]
    pub catchup: bool,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            id: None,
            start_date: None,
            schedule: default_schedule(),
            max_active_runs: default_max_active_runs(),
            catchup: false,
        }
    }
}

/// `[default]` section: retry policy applied to every task.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageConfig {
    /// Stages that must succeed before this one starts.
    #[serde(default)]
    pub after: Vec<String>,

    /// Stage names the task executes; defaults to the section name.
    /// Accepts a single string or a list.
    #[serde(default)]
    pub nodes: Option<StageBinding>,

    /// Explicit task id instead of the normalized stage name.
    #[serde(default)]
    pub task_id: Option<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,
}

fn default_pipeline_name() -> String {
    DEFAULT_PIPELINE.to_string()
}

fn default_project_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_env() -> String {
    "local".to_string()
}

fn default_program() -> String {
    "kedro".to_string()
}

fn default_runner_args() -> Vec<String> {
    vec!["run".to_string()]
}

fn default_schedule() -> String {
    "@once".to_string()
}

fn default_max_active_runs() -> usize {
    3
}

fn default_retries() -> u32 {
    1
}

fn default_retry_delay() -> String {
    "5m".to_string()
}

/// Parse a `start_date` value.
pub(crate) fn parse_start_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            StagedagError::ConfigError(format!(
                "invalid [graph].start_date '{raw}' (expected RFC 3339 or YYYY-MM-DD)"
            ))
        })
}

pub(crate) fn parse_retry_delay(raw: &str, context: &str) -> Result<Duration> {
    parse_duration(raw)
        .map_err(|e| StagedagError::ConfigError(format!("invalid retry_delay in {context}: {e}")))
}

impl ConfigFile {
    /// Construct without validation. Prefer `TryFrom<RawConfigFile>`.
    pub fn new_unchecked(
        pipeline: PipelineSection,
        runner: RunnerSection,
        graph: GraphSection,
        default: DefaultSection,
        stage: BTreeMap<String, StageConfig>,
    ) -> Self {
        Self {
            pipeline,
            runner,
            graph,
            default,
            stage,
        }
    }

    pub fn graph_id(&self) -> &str {
        self.graph.id.as_deref().unwrap_or(&self.pipeline.package)
    }

    pub fn default_retry(&self) -> Result<RetryPolicy> {
        let delay = parse_retry_delay(&self.default.retry_delay, "[default]")?;
        Ok(RetryPolicy::new(self.default.retries, delay))
    }

    /// Retry policy of one stage, if it overrides anything.
    pub fn stage_retry(&self, name: &str) -> Result<Option<RetryPolicy>> {
        let Some(stage) = self.stage.get(name) else {
            return Ok(None);
        };
        if stage.retries.is_none() && stage.retry_delay.is_none() {
            return Ok(None);
        }

        let default = self.default_retry()?;
        let delay = match &stage.retry_delay {
            Some(raw) => parse_retry_delay(raw, &format!("[stage.{name}]"))?,
            None => default.retry_delay,
        };
        Ok(Some(RetryPolicy::new(
            stage.retries.unwrap_or(default.retries),
            delay,
        )))
    }

    /// The stage dependency table described by the `after` lists.
    pub fn dependency_table(&self) -> DependencyTable {
        let mut table = DependencyTable::new();
        for (name, stage) in &self.stage {
            table.add_stage(name.as_str());
            for upstream in &stage.after {
                table.add_edge(upstream.as_str(), name.as_str());
            }
        }
        table
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new(&self.pipeline.project_path, &self.pipeline.env)
            .with_config_source(&self.pipeline.conf_source)
            .with_pipeline(&self.pipeline.pipeline_name)
    }

    pub fn timetable(&self) -> Result<Timetable> {
        let cadence: Cadence = self.graph.schedule.parse()?;
        let start_date = match &self.graph.start_date {
            Some(raw) => parse_start_date(raw)?,
            None => Utc::now(),
        };
        Ok(Timetable::new(start_date, cadence, self.graph.catchup))
    }

    pub fn graph_metadata(&self) -> Result<GraphMetadata> {
        Ok(GraphMetadata::new(self.graph_id(), self.timetable()?)
            .with_max_active_runs(self.graph.max_active_runs)
            .with_default_retry(self.default_retry()?))
    }

    /// The pipeline runner described by `[runner]`.
    pub fn process_runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.runner.program.clone(), self.runner.args.clone())
    }

    /// A strict assembler with every declared stage and its overrides.
    pub fn assembler(&self, runner: Arc<dyn PipelineRunner>) -> Result<GraphAssembler> {
        let mut assembler =
            GraphAssembler::new(self.pipeline.package.clone(), self.run_context(), runner)
                .with_default_retry(self.default_retry()?)
                .strict(true);

        for (name, stage) in &self.stage {
            let overrides = StageOverrides {
                task_id: stage.task_id.as_deref().map(TaskId::parse).transpose()?,
                binding: stage.nodes.clone(),
                retry: self.stage_retry(name)?,
            };
            assembler = assembler.with_stage(name.as_str(), overrides);
        }

        Ok(assembler)
    }

    /// Assemble the task graph described by this file.
    pub fn assemble(&self, runner: Arc<dyn PipelineRunner>) -> Result<TaskGraph> {
        self.assembler(runner)?.assemble(&self.dependency_table())
    }
}
