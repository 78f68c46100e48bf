// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s together with the current time and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels and driving the tick timer
//! - sending `ScheduledTask`s to the executor and arming retry timers
//! - persisting runs and delivering notifications
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, processes or wall clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dag::{WorkflowDefinition, WorkflowRun};
use crate::engine::event_handlers::{
    handle_cancel, handle_retry_due, handle_run_requested, handle_task_completion, handle_tick,
    resume_runs, ActiveRuns, CoreCommand, CoreStep,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::schedule::Scheduler;
use crate::types::RunKey;

/// A run that has not finished yet, with the definition it was created from.
///
/// Holding the definition keeps in-flight runs consistent even if the
/// workflow is reloaded or unloaded meanwhile.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub def: Arc<WorkflowDefinition>,
    pub run: WorkflowRun,
}

/// Pure core runtime state.
///
/// This owns:
/// - the scheduler (and through it the workflow registry)
/// - every pending or running workflow run
/// - runtime options (e.g. `exit_when_idle`)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    runs: ActiveRuns,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RuntimeOptions) -> Self {
        Self {
            scheduler,
            runs: ActiveRuns::new(),
            options,
        }
    }

    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// No run is pending or running.
    pub fn is_idle(&self) -> bool {
        self.runs.is_empty()
    }

    /// Current state of an active run. Finished runs are only in the store.
    pub fn status(&self, key: &RunKey) -> Option<&WorkflowRun> {
        self.runs.get(key).map(|a| &a.run)
    }

    pub fn active_runs(&self) -> impl Iterator<Item = &WorkflowRun> {
        self.runs.values().map(|a| &a.run)
    }

    /// Adopt runs loaded from the run store after a restart.
    ///
    /// Never requests an exit; the first tick decides whether there is work.
    pub fn resume(&mut self, stored: Vec<WorkflowRun>, now: DateTime<Utc>) -> CoreStep {
        resume_runs(&mut self.scheduler, &mut self.runs, stored, now)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent, now: DateTime<Utc>) -> CoreStep {
        let step = match event {
            RuntimeEvent::Tick => handle_tick(&mut self.scheduler, &mut self.runs, now),
            RuntimeEvent::RunRequested {
                workflow_id,
                scheduled_for,
            } => handle_run_requested(
                &mut self.scheduler,
                &mut self.runs,
                workflow_id,
                scheduled_for,
                now,
            ),
            RuntimeEvent::TaskCompleted {
                run,
                task,
                attempt,
                outcome,
            } => handle_task_completion(&mut self.runs, run, task, attempt, outcome, now),
            RuntimeEvent::RetryDue { run, task, attempt } => {
                handle_retry_due(&mut self.runs, run, task, attempt, now)
            }
            RuntimeEvent::CancelRun { run } => handle_cancel(&mut self.runs, run, now),
            RuntimeEvent::ShutdownRequested => {
                return CoreStep {
                    commands: Vec::new(),
                    keep_running: false,
                };
            }
        };

        self.finish_step(step)
    }

    fn finish_step(&self, mut step: CoreStep) -> CoreStep {
        if self.options.exit_when_idle && self.is_idle() {
            step.commands.push(CoreCommand::RequestExit);
            step.keep_running = false;
        }
        step
    }
}
