// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{parse_retry_delay, parse_start_date, ConfigFile, RawConfigFile};
use crate::errors::{Result, StagedagError};
use crate::pipeline::is_valid_package;
use crate::schedule::Cadence;
use crate::types::TaskId;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StagedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.pipeline,
            raw.runner,
            raw.graph,
            raw.default,
            raw.stage,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_pipeline_section(cfg)?;
    validate_graph_section(cfg)?;
    validate_retry_settings(cfg)?;
    validate_stage_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(StagedagError::ConfigError(
            "config must contain at least one [stage.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_pipeline_section(cfg: &RawConfigFile) -> Result<()> {
    let package = cfg.pipeline.package.trim();
    if package.is_empty() {
        return Err(StagedagError::ConfigError(
            "[pipeline].package must not be empty".to_string(),
        ));
    }
    if !is_valid_package(package) {
        return Err(StagedagError::ConfigError(format!(
            "[pipeline].package '{package}' is not a valid package identifier"
        )));
    }
    if cfg.pipeline.pipeline_name.trim().is_empty() {
        return Err(StagedagError::ConfigError(
            "[pipeline].pipeline_name must not be empty".to_string(),
        ));
    }
    if cfg.runner.program.trim().is_empty() {
        return Err(StagedagError::ConfigError(
            "[runner].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_graph_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.graph.max_active_runs == 0 {
        return Err(StagedagError::ConfigError(
            "[graph].max_active_runs must be >= 1 (got 0)".to_string(),
        ));
    }

    cfg.graph.schedule.parse::<Cadence>()?;

    if let Some(raw) = &cfg.graph.start_date {
        parse_start_date(raw)?;
    }
    Ok(())
}

fn validate_retry_settings(cfg: &RawConfigFile) -> Result<()> {
    parse_retry_delay(&cfg.default.retry_delay, "[default]")?;

    for (name, stage) in cfg.stage.iter() {
        if let Some(raw) = &stage.retry_delay {
            parse_retry_delay(raw, &format!("[stage.{name}]"))?;
        }
        if let Some(id) = &stage.task_id {
            TaskId::parse(id)?;
        }
    }
    Ok(())
}

fn validate_stage_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            if dep == name {
                return Err(StagedagError::ConfigError(format!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.stage.contains_key(dep) {
                return Err(StagedagError::UnknownStage(format!(
                    "{dep} (referenced by `after` of stage '{name}')"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> stage
    // For:
    //   [stage.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(StagedagError::DagCycle(format!(
            "cycle detected in stage dependencies involving stage '{}'",
            cycle.node_id()
        ))),
    }
}
