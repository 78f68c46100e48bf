// src/dag/task_run.rs

//! Per-run task state and the dispatch description handed to workers.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::definition::TaskDefinition;
use crate::types::{RunKey, TaskName, TaskRunState};

/// One task instantiated inside a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task: TaskName,
    pub state: TaskRunState,
    /// 0 for the first invocation, incremented before each retry.
    pub attempt: u32,
    pub last_error: Option<String>,
    /// Failed because an upstream task failed; never invoked.
    #[serde(default)]
    pub skipped: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest instant of the next attempt while `FailedRetryable`.
    pub retry_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn new(task: TaskName, has_dependencies: bool) -> Self {
        Self {
            task,
            state: if has_dependencies {
                TaskRunState::Blocked
            } else {
                TaskRunState::Ready
            },
            attempt: 0,
            last_error: None,
            skipped: false,
            started_at: None,
            finished_at: None,
            retry_at: None,
        }
    }
}

/// Description of a task invocation that should start now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub run: RunKey,
    pub task: TaskName,
    pub command: String,
    pub env: BTreeMap<String, String>,
    /// Attempt number this invocation belongs to; completions carrying an
    /// older attempt are discarded.
    pub attempt: u32,
    pub timeout: Option<Duration>,
}

impl ScheduledTask {
    pub fn from_definition(run: &RunKey, def: &TaskDefinition, attempt: u32) -> Self {
        Self {
            run: run.clone(),
            task: def.id.clone(),
            command: def.command.clone(),
            env: def.env.clone(),
            attempt,
            timeout: def.policy.execution_timeout,
        }
    }
}
