// src/config/mod.rs

//! Configuration loading and validation for stagedag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate stage references, cycles and metadata (`validate.rs`).
//! - Turn a validated file into assembler inputs and graph metadata.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, DEFAULT_CONFIG_FILE};
pub use model::{
    ConfigFile, DefaultSection, GraphSection, PipelineSection, RawConfigFile, RunnerSection,
    StageConfig,
};
