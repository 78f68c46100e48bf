// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually running task commands and
//! reporting back to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`shell`] provides [`ShellExecutor`], which runs commands through
//!   `sh -c` using `tokio::process::Command`.
//! - [`executor_loop`] owns the background loop that tracks in-flight
//!   invocations and cancels them on request.
//! - [`task_runner`] runs one invocation: concurrency permit, timeout,
//!   cancellation, and the `TaskCompleted` event.
//! - [`backend`] provides the `ExecutorBackend` trait and the [`WorkerPool`]
//!   that the runtime uses in production, and which tests can replace with a
//!   fake implementation.

use std::future::Future;
use std::pin::Pin;

use crate::engine::TaskOutcome;

pub mod backend;
pub mod executor_loop;
pub mod shell;
pub mod task_runner;

pub use backend::{ExecutorBackend, WorkerPool};
pub use shell::ShellExecutor;

/// What a task executor is asked to run: the command, its environment and
/// the run context.
pub use crate::dag::ScheduledTask as ExecutionRequest;

/// Default size of the worker pool.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// The only component that talks to the outside world.
///
/// Implementations turn one invocation into a [`TaskOutcome`]. Any error
/// (spawn failure, non-zero exit, ...) must be reported as
/// `TaskOutcome::Failed`, never by panicking. The returned future may be
/// dropped at any point when the invocation is cancelled or times out.
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        request: &'a ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'a>>;
}
