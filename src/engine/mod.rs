// src/engine/mod.rs

//! Orchestration engine for crondag.
//!
//! This module ties together:
//! - the schedule evaluation (which runs are due)
//! - the per-run DAG state machines
//! - the main runtime event loop that reacts to:
//!   - scheduler ticks and manual run requests
//!   - task completion events from the worker pool
//!   - retry timers
//!   - cancellation and shutdown requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::errors::{Error, Result};

pub use crate::types::{RunKey, TaskName, WorkflowId};

/// Outcome of one task invocation, as reported by the task executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success { message: Option<String> },
    Failed { message: Option<String> },
}

impl TaskOutcome {
    pub fn success() -> Self {
        TaskOutcome::Success { message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no run is active (used for `--once`).
    pub exit_when_idle: bool,
    /// How often the shell evaluates schedules. `None` disables periodic
    /// ticks; ticks can still be sent as events.
    pub tick_interval: Option<Duration>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            exit_when_idle: false,
            tick_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// Events flowing into the runtime from timers, workers and callers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Evaluate schedules against the current time.
    Tick,
    /// Manual run of a workflow for a given logical instant.
    RunRequested {
        workflow_id: WorkflowId,
        scheduled_for: DateTime<Utc>,
    },
    /// A task invocation finished.
    TaskCompleted {
        run: RunKey,
        task: TaskName,
        attempt: u32,
        outcome: TaskOutcome,
    },
    /// The retry delay of a task elapsed.
    RetryDue {
        run: RunKey,
        task: TaskName,
        attempt: u32,
    },
    /// Cancel a workflow run and its in-flight invocations.
    CancelRun { run: RunKey },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Cloneable handle for feeding events into a running [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl RuntimeHandle {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: RuntimeEvent) -> Result<()> {
        self.tx.send(event).await.map_err(Error::from)?;
        Ok(())
    }

    pub async fn tick(&self) -> Result<()> {
        self.send(RuntimeEvent::Tick).await
    }

    pub async fn trigger(&self, workflow_id: &str, scheduled_for: DateTime<Utc>) -> Result<()> {
        self.send(RuntimeEvent::RunRequested {
            workflow_id: workflow_id.to_string(),
            scheduled_for,
        })
        .await
    }

    pub async fn cancel(&self, run: RunKey) -> Result<()> {
        self.send(RuntimeEvent::CancelRun { run }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(RuntimeEvent::ShutdownRequested).await
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
