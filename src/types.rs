// src/types.rs

//! Small value types shared by the assembler, the executor and the scheduler.

use std::borrow::Borrow;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::errors::{Result, StagedagError};

/// Name of a pipeline stage, as registered with the pipeline runner.
pub type StageName = String;

/// Longest identifier the scheduler accepts.
pub const MAX_TASK_ID_LEN: usize = 250;

static TASK_ID_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.\-]+").expect("static regex"));

static TASK_ID_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static regex"));

/// Scheduler-visible identifier of a task node.
///
/// Derived ids never contain underscores: every run of characters outside
/// `[A-Za-z0-9.-]` collapses to a single `-`, so `split_data_node` becomes
/// `split-data-node`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Derive a task id from a stage name.
    pub fn from_stage(stage: &str) -> Result<Self> {
        let replaced = TASK_ID_SEPARATORS.replace_all(stage.trim(), "-");
        let id = replaced.trim_matches('-');
        Self::parse(id).map_err(|_| StagedagError::InvalidTaskId(stage.to_string()))
    }

    /// Validate an explicitly chosen task id without transforming it.
    pub fn parse(id: &str) -> Result<Self> {
        if id.is_empty() || id.len() > MAX_TASK_ID_LEN || !TASK_ID_SYNTAX.is_match(id) {
            return Err(StagedagError::InvalidTaskId(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one scheduled run of the whole graph.
pub type RunId = u64;

/// The stage names a task executes, always as a non-empty ordered list.
///
/// A single name and a one-element list produce the same value, so nothing
/// downstream has to care which form the caller used. Repeated names are
/// dropped, keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawBinding")]
pub struct StageBinding(Vec<StageName>);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBinding {
    One(String),
    Many(Vec<String>),
}

impl StageBinding {
    /// Build a binding from any list of names; fails when no name is given.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stages: Vec<StageName> = Vec::new();
        for name in names {
            let name = name.into();
            let name = name.trim();
            if name.is_empty() {
                return Err(StagedagError::ConfigError(
                    "stage binding contains an empty stage name".to_string(),
                ));
            }
            if !stages.iter().any(|s| s == name) {
                stages.push(name.to_string());
            }
        }

        if stages.is_empty() {
            return Err(StagedagError::ConfigError(
                "a task must be bound to at least one stage".to_string(),
            ));
        }

        Ok(Self(stages))
    }

    /// Bind a single stage.
    pub fn single(name: impl Into<String>) -> Result<Self> {
        Self::new([name.into()])
    }

    /// The first bound stage; tasks are named after it by default.
    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    pub fn as_slice(&self) -> &[StageName] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<RawBinding> for StageBinding {
    type Error = StagedagError;

    fn try_from(raw: RawBinding) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawBinding::One(name) => StageBinding::single(name),
            RawBinding::Many(names) => StageBinding::new(names),
        }
    }
}

impl TryFrom<&str> for StageBinding {
    type Error = StagedagError;

    fn try_from(name: &str) -> std::result::Result<Self, Self::Error> {
        StageBinding::single(name)
    }
}

impl TryFrom<Vec<String>> for StageBinding {
    type Error = StagedagError;

    fn try_from(names: Vec<String>) -> std::result::Result<Self, Self::Error> {
        StageBinding::new(names)
    }
}

impl fmt::Display for StageBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(","))
    }
}

/// Parse a duration such as `"30s"`, `"5m"` or `"1h30m"`.
///
/// Supported units: `ms`, `s`, `m`, `h`, `d`. A bare `0` is accepted as zero.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let idx = rest
            .chars()
            .position(|c| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;
        if idx == 0 {
            return Err(format!("invalid duration '{s}'"));
        }

        let (num_part, tail) = rest.split_at(idx);
        let value: u64 = num_part
            .parse()
            .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

        let unit_len = tail
            .chars()
            .position(|c| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let too_large = || format!("duration '{s}' is too large");
        let part = match unit.trim().to_lowercase().as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(too_large)?),
            "h" => Duration::from_secs(value.checked_mul(60 * 60).ok_or_else(too_large)?),
            "d" => Duration::from_secs(value.checked_mul(60 * 60 * 24).ok_or_else(too_large)?),
            other => {
                return Err(format!(
                    "unsupported duration unit '{other}'; expected ms, s, m, h or d"
                ));
            }
        };

        total = total.checked_add(part).ok_or_else(too_large)?;
        rest = next;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_normalizes_separators() {
        let id = TaskId::from_stage("preprocess_companies_node").unwrap();
        assert_eq!(id.as_str(), "preprocess-companies-node");

        let id = TaskId::from_stage("  train model__v2 ").unwrap();
        assert_eq!(id.as_str(), "train-model-v2");
    }

    #[test]
    fn task_id_rejects_names_without_usable_characters() {
        assert!(matches!(
            TaskId::from_stage("___"),
            Err(StagedagError::InvalidTaskId(_))
        ));
        assert!(TaskId::parse("has space").is_err());
        assert!(TaskId::parse(&"x".repeat(MAX_TASK_ID_LEN + 1)).is_err());
        assert!(TaskId::parse("keeps_underscores").is_ok());
    }

    #[test]
    fn single_name_and_one_element_list_are_equivalent() {
        let one = StageBinding::try_from("split_data_node").unwrap();
        let many = StageBinding::try_from(vec!["split_data_node".to_string()]).unwrap();
        assert_eq!(one, many);
        assert_eq!(one.as_slice(), ["split_data_node".to_string()]);
    }

    #[test]
    fn binding_dedups_and_rejects_empty() {
        let b = StageBinding::new(["a", "b", "a"]).unwrap();
        assert_eq!(b.as_slice(), ["a".to_string(), "b".to_string()]);
        assert_eq!(b.primary(), "a");

        assert!(StageBinding::new(Vec::<String>::new()).is_err());
        assert!(StageBinding::new([" "]).is_err());
    }

    #[test]
    fn binding_deserializes_from_either_form() {
        #[derive(Deserialize)]
        struct Holder {
            nodes: StageBinding,
        }

        let one: Holder = toml::from_str(r#"nodes = "a""#).unwrap();
        let many: Holder = toml::from_str(r#"nodes = ["a"]"#).unwrap();
        assert_eq!(one.nodes, many.nodes);

        let empty: std::result::Result<Holder, _> = toml::from_str("nodes = []");
        assert!(empty.is_err());
    }

    #[test]
    fn parses_simple_and_compound_durations() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("3w").is_err());
        assert!(parse_duration("m5").is_err());
    }

    #[test]
    fn oversized_durations_are_errors() {
        let err = parse_duration("999999999999999999d").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("18446744073709551615h").is_err());

        let max = u64::MAX;
        let err = parse_duration(&format!("{max}s{max}s")).unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert_eq!(
            parse_duration(&format!("{max}s")).unwrap(),
            Duration::from_secs(max)
        );
    }
}
