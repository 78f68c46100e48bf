// src/types.rs

//! Small shared types: identifiers, run/task states, store mode, durations.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Canonical task id type used throughout the engine.
pub type TaskName = String;

/// Canonical workflow id type.
pub type WorkflowId = String;

/// Identity of one workflow run: a workflow instantiated for one logical
/// schedule instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub workflow_id: WorkflowId,
    pub scheduled_for: DateTime<Utc>,
}

impl RunKey {
    pub fn new(workflow_id: impl Into<WorkflowId>, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            scheduled_for,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.workflow_id,
            self.scheduled_for.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// State of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunState {
    /// Created but waiting for a free `max_active_runs` slot.
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkflowRunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowRunState::Succeeded | WorkflowRunState::Failed | WorkflowRunState::Cancelled
        )
    }
}

/// State of one task inside a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskRunState {
    /// Waiting on upstream tasks.
    Blocked,
    /// Dependencies satisfied; not yet handed to a worker.
    Ready,
    /// Handed to a worker; an invocation is in flight.
    Running,
    Succeeded,
    /// Last invocation failed; a retry is scheduled.
    FailedRetryable,
    /// Retries exhausted, or skipped because an upstream task failed.
    FailedTerminal,
    Cancelled,
}

impl TaskRunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskRunState::Succeeded | TaskRunState::FailedTerminal | TaskRunState::Cancelled
        )
    }
}

/// Where workflow run records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// One JSON document per run under `<state_dir>/runs/`.
    File,
    /// In memory only (lost on restart).
    Memory,
}

impl Default for StoreMode {
    fn default() -> Self {
        StoreMode::File
    }
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreMode::File),
            "memory" => Ok(StoreMode::Memory),
            other => Err(format!(
                "invalid store mode: {other} (expected \"file\" or \"memory\")"
            )),
        }
    }
}

/// Parse a duration string such as `"500ms"`, `"30s"`, `"5m"`, `"2h"`, `"1d"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

    let seconds_per_unit: u64 = match unit_part.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        unit => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, h or d",
                unit
            ));
        }
    };

    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration(" 2h "), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d"), Ok(Duration::from_secs(86_400)));
    }

    #[test]
    fn rejects_missing_or_unknown_units() {
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10w").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn rejects_durations_that_overflow() {
        let err = parse_duration("300000000000000000d").unwrap_err();
        assert!(err.contains("overflows"), "{err}");
        assert!(parse_duration("18446744073709551615m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }
}
