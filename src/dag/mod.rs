// src/dag/mod.rs

//! Workflow definitions, dependency graphs and per-run state machines.
//!
//! - [`definition`] holds validated, immutable workflow/task definitions
//!   and the [`WorkflowBuilder`] that produces them.
//! - [`graph`] holds the directed acyclic graph of one workflow's tasks.
//! - [`workflow_run`] contains the per-run state machine that decides which
//!   tasks are ready, applies outcomes and retries, and fails dependents.
//! - [`task_run`] provides per-task run state and scheduled task types.
//! - [`run_step`] defines the result type for run steps.

pub mod definition;
pub mod graph;
pub mod run_step;
pub mod task_run;
pub mod workflow_run;

pub use definition::{
    PolicyOverrides, RetryDecision, RetryPolicy, TaskDefinition, TaskPolicy, TaskSpec,
    WorkflowBuilder, WorkflowDefinition,
};
pub use graph::DagGraph;
pub use run_step::{RetryRequest, RunStep};
pub use task_run::{ScheduledTask, TaskRun};
pub use workflow_run::WorkflowRun;
