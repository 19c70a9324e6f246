// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Errors fall into three families:
//! - configuration: bad project file, unusable run context
//! - execution: a stage raised while the pipeline runner executed it
//! - assembly: the dependency table does not describe a valid graph
//!
//! None of these are recovered from locally. Assembly errors abort before any
//! task is scheduled; everything else surfaces as a task failure and is left to
//! the scheduler's retry policy.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cannot open run context for project {project:?}: {reason}")]
    ContextError { project: PathBuf, reason: String },

    #[error("Stage execution failed for {stages:?}: {reason}")]
    StageFailed { stages: Vec<String>, reason: String },

    #[error("Unknown stage referenced in dependency table: {0}")]
    UnknownStage(String),

    #[error("Unknown task referenced by dependency edge: {0}")]
    UnknownTask(String),

    #[error("Task id '{task_id}' is produced by both '{first}' and '{second}'")]
    DuplicateTaskId {
        task_id: String,
        first: String,
        second: String,
    },

    #[error("Invalid task id '{0}'")]
    InvalidTaskId(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StagedagError {
    /// Whether this error was raised while assembling the task graph.
    ///
    /// Assembly errors are fatal and never retried.
    pub fn is_assembly(&self) -> bool {
        matches!(
            self,
            StagedagError::UnknownStage(_)
                | StagedagError::UnknownTask(_)
                | StagedagError::DuplicateTaskId { .. }
                | StagedagError::InvalidTaskId(_)
                | StagedagError::DagCycle(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StagedagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_errors_are_classified() {
        assert!(StagedagError::DagCycle("a".into()).is_assembly());
        assert!(StagedagError::UnknownStage("a".into()).is_assembly());
        assert!(!StagedagError::ConfigError("a".into()).is_assembly());
        assert!(
            !StagedagError::StageFailed {
                stages: vec!["a".into()],
                reason: "boom".into()
            }
            .is_assembly()
        );
    }
}
