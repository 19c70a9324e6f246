// src/schedule.rs

//! Graph-level scheduling metadata: cadence, timetable and run limits.
//!
//! Cadence expressions:
//! - `@once`: a single run at the start date
//! - `@none` / `none`: never scheduled, runs only when triggered by hand
//! - `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`
//! - `@every <duration>`, e.g. `@every 6h` or `@every 1h30m`
//! - 5-field cron (`min hour dom month dow`) or 6/7-field cron with seconds

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::dag::RetryPolicy;
use crate::errors::{Result, StagedagError};
use crate::types::parse_duration;

/// Upper bound on how many missed runs a single catch-up pass emits.
pub const MAX_BACKFILL: usize = 1000;

/// How often a graph runs.
#[derive(Debug, Clone)]
pub enum Cadence {
    Once,
    Manual,
    Every(Duration),
    Cron {
        expression: String,
        schedule: Box<cron::Schedule>,
    },
}

impl Cadence {
    fn cron(expression: &str) -> Result<Self> {
        let fields = expression.split_whitespace().count();
        // The cron crate wants seconds; plain 5-field cron starts at second 0.
        let full = if fields == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };

        let schedule = cron::Schedule::from_str(&full).map_err(|e| {
            StagedagError::ConfigError(format!("invalid cron expression '{expression}': {e}"))
        })?;

        Ok(Cadence::Cron {
            expression: expression.to_string(),
            schedule: Box::new(schedule),
        })
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Cadence::Every(_) | Cadence::Cron { .. })
    }
}

impl FromStr for Cadence {
    type Err = StagedagError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let lower = trimmed.to_lowercase();

        match lower.as_str() {
            "@once" => Ok(Cadence::Once),
            "@none" | "none" => Ok(Cadence::Manual),
            "@hourly" | "@daily" | "@weekly" | "@monthly" | "@yearly" | "@annually" => {
                Cadence::cron(&lower)
            }
            other if other.starts_with("@every") => {
                let raw = other.trim_start_matches("@every").trim();
                let every = parse_duration(raw).map_err(|e| {
                    StagedagError::ConfigError(format!("invalid schedule '{trimmed}': {e}"))
                })?;
                if every.is_zero() {
                    return Err(StagedagError::ConfigError(format!(
                        "invalid schedule '{trimmed}': interval must be greater than zero"
                    )));
                }
                if TimeDelta::from_std(every).is_err() {
                    return Err(StagedagError::ConfigError(format!(
                        "invalid schedule '{trimmed}': interval is too large"
                    )));
                }
                Ok(Cadence::Every(every))
            }
            other if other.starts_with('@') => Err(StagedagError::ConfigError(format!(
                "unknown schedule preset '{trimmed}'"
            ))),
            "" => Err(StagedagError::ConfigError("schedule must not be empty".into())),
            _ => Cadence::cron(trimmed),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Once => f.write_str("@once"),
            Cadence::Manual => f.write_str("@none"),
            Cadence::Every(d) => write!(f, "@every {}s", d.as_secs()),
            Cadence::Cron { expression, .. } => f.write_str(expression),
        }
    }
}

/// When runs are due, derived from a start date and a cadence.
#[derive(Debug, Clone)]
pub struct Timetable {
    pub start_date: DateTime<Utc>,
    pub cadence: Cadence,
    /// Emit every missed occurrence instead of only the latest one.
    pub catchup: bool,
}

impl Timetable {
    pub fn new(start_date: DateTime<Utc>, cadence: Cadence, catchup: bool) -> Self {
        Self {
            start_date,
            cadence,
            catchup,
        }
    }

    /// Occurrences strictly after `after` (or from the start date, inclusive).
    fn occurrences(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = DateTime<Utc>> + '_> {
        let start = self.start_date;

        match &self.cadence {
            Cadence::Manual => Box::new(std::iter::empty()),
            Cadence::Once => match after {
                Some(t) if t >= start => Box::new(std::iter::empty()),
                _ => Box::new(std::iter::once(start)),
            },
            Cadence::Every(every) => {
                let Ok(step) = TimeDelta::from_std(*every) else {
                    return Box::new(std::iter::empty());
                };
                let first = match after {
                    Some(t) if t >= start => {
                        let elapsed = (t - start).num_milliseconds();
                        let step_ms = step.num_milliseconds().max(1);
                        let k = elapsed / step_ms + 1;
                        k.checked_mul(step_ms)
                            .and_then(TimeDelta::try_milliseconds)
                            .and_then(|offset| start.checked_add_signed(offset))
                    }
                    _ => Some(start),
                };
                // Past the representable range the timetable simply ends.
                Box::new(std::iter::successors(first, move |t| t.checked_add_signed(step)))
            }
            Cadence::Cron { schedule, .. } => {
                let floor = start - TimeDelta::milliseconds(1);
                let from = match after {
                    Some(t) if t > floor => t,
                    _ => floor,
                };
                Box::new(schedule.after(&from))
            }
        }
    }

    /// First occurrence of the timetable, if any.
    pub fn first(&self) -> Option<DateTime<Utc>> {
        self.occurrences(None).next()
    }

    /// The next occurrence strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.occurrences(Some(t)).next()
    }

    /// Latest occurrence at or before `now`.
    pub fn latest_at_or_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if now < self.start_date {
            return None;
        }

        match &self.cadence {
            Cadence::Manual => None,
            Cadence::Once => Some(self.start_date),
            Cadence::Every(every) => {
                let step_ms = TimeDelta::from_std(*every).ok()?.num_milliseconds().max(1);
                let k = (now - self.start_date).num_milliseconds() / step_ms;
                let offset = TimeDelta::try_milliseconds(k.checked_mul(step_ms)?)?;
                self.start_date.checked_add_signed(offset)
            }
            Cadence::Cron { schedule, .. } => {
                let bound = now + TimeDelta::seconds(1);
                schedule
                    .after(&bound)
                    .rev()
                    .take_while(|t| *t >= self.start_date)
                    .find(|t| *t <= now)
            }
        }
    }

    /// Logical dates that are due at `now`, given the last emitted one.
    ///
    /// With catch-up every missed occurrence is returned (oldest first, at
    /// most [`MAX_BACKFILL`]); without it only the latest due occurrence.
    pub fn due_runs(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        if self.catchup {
            let due: Vec<_> = self
                .occurrences(last)
                .take_while(|t| *t <= now)
                .take(MAX_BACKFILL)
                .collect();
            if due.len() == MAX_BACKFILL {
                debug!(
                    limit = MAX_BACKFILL,
                    "catch-up capped; remaining runs follow on the next tick"
                );
            }
            return due;
        }

        match self.latest_at_or_before(now) {
            Some(latest) if last.is_none_or(|l| latest > l) => vec![latest],
            _ => Vec::new(),
        }
    }

    /// Whether no occurrence exists after `last`.
    pub fn is_exhausted(&self, last: Option<DateTime<Utc>>) -> bool {
        self.occurrences(last).next().is_none()
    }
}

/// Everything the scheduler needs to know about a graph besides its tasks.
#[derive(Debug, Clone)]
pub struct GraphMetadata {
    pub graph_id: String,
    pub timetable: Timetable,
    /// Maximum number of runs executing at the same time.
    pub max_active_runs: usize,
    pub default_retry: RetryPolicy,
}

impl GraphMetadata {
    pub fn new(graph_id: impl Into<String>, timetable: Timetable) -> Self {
        Self {
            graph_id: graph_id.into(),
            timetable,
            max_active_runs: 3,
            default_retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_active_runs(mut self, max_active_runs: usize) -> Self {
        self.max_active_runs = max_active_runs;
        self
    }

    pub fn with_default_retry(mut self, retry: RetryPolicy) -> Self {
        self.default_retry = retry;
        self
    }
}
