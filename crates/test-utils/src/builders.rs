use std::collections::BTreeMap;

use stagedag::config::{
    ConfigFile, DefaultSection, GraphSection, PipelineSection, RawConfigFile, RunnerSection,
    StageConfig,
};
use stagedag::stage::DependencyTable;
use stagedag::types::StageBinding;

/// The spaceflights tutorial dependency table, in map form.
pub fn spaceflights_table() -> DependencyTable {
    DependencyTable::new()
        .depends_on(
            "create_model_input_table",
            ["preprocess_companies", "preprocess_shuttles"],
        )
        .depends_on("split_data", ["create_model_input_table"])
        .depends_on("train_model", ["split_data"])
        .depends_on("evaluate_model", ["split_data", "train_model"])
}

/// Builder for `RawConfigFile` / `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(package: &str) -> Self {
        Self {
            config: RawConfigFile {
                pipeline: PipelineSection {
                    package: package.to_string(),
                    pipeline_name: "__default__".to_string(),
                    project_path: ".".into(),
                    env: "local".to_string(),
                    conf_source: String::new(),
                },
                runner: RunnerSection::default(),
                graph: GraphSection::default(),
                default: DefaultSection::default(),
                stage: BTreeMap::new(),
            },
        }
    }

    pub fn with_stage(mut self, name: &str, stage: StageConfig) -> Self {
        self.config.stage.insert(name.to_string(), stage);
        self
    }

    pub fn env(mut self, env: &str) -> Self {
        self.config.pipeline.env = env.to_string();
        self
    }

    pub fn schedule(mut self, schedule: &str) -> Self {
        self.config.graph.schedule = schedule.to_string();
        self
    }

    pub fn max_active_runs(mut self, n: usize) -> Self {
        self.config.graph.max_active_runs = n;
        self
    }

    pub fn default_retries(mut self, retries: u32, delay: &str) -> Self {
        self.config.default.retries = retries;
        self.config.default.retry_delay = delay.to_string();
        self
    }

    /// The unvalidated file, for tests that expect validation to fail.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `StageConfig`.
#[derive(Default)]
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.stage.after.push(dep.to_string());
        self
    }

    pub fn nodes(mut self, nodes: &[&str]) -> Self {
        let binding = StageBinding::new(nodes.iter().copied()).expect("non-empty binding");
        self.stage.nodes = Some(binding);
        self
    }

    pub fn task_id(mut self, id: &str) -> Self {
        self.stage.task_id = Some(id.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.stage.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: &str) -> Self {
        self.stage.retry_delay = Some(delay.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}
