// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake backend in tests while keeping the
//! production worker pool in [`executor_loop`](super::executor_loop).
//!
//! - [`WorkerPool`] is the default implementation used by `crondag`. It
//!   wraps the `spawn_executor` loop and forwards dispatch and cancel
//!   requests over an mpsc channel.
//! - Tests usually keep the `WorkerPool` and plug a scripted
//!   [`TaskExecutor`] into it instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};
use crate::exec::executor_loop::{spawn_executor, ExecutorMessage};
use crate::exec::TaskExecutor;
use crate::types::{RunKey, TaskName};

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution. Must not wait for them to
    /// finish; completions come back as `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Best-effort cancellation of in-flight invocations of `tasks` in `run`.
    fn cancel_tasks(
        &mut self,
        run: RunKey,
        tasks: Vec<TaskName>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Bounded pool of workers around a [`TaskExecutor`].
///
/// Each dispatched task runs on its own Tokio task; a semaphore of
/// `max_concurrency` permits bounds how many invocations execute at once.
pub struct WorkerPool {
    tx: mpsc::Sender<ExecutorMessage>,
}

impl WorkerPool {
    /// Create the pool and spawn its background loop immediately.
    ///
    /// `max_concurrency` is clamped to at least 1.
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        max_concurrency: usize,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        let tx = spawn_executor(executor, max_concurrency.max(1), runtime_tx);
        Self { tx }
    }
}

impl ExecutorBackend for WorkerPool {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(ExecutorMessage::Run(task))
                    .await
                    .map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_tasks(
        &mut self,
        run: RunKey,
        tasks: Vec<TaskName>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(ExecutorMessage::Cancel { run, tasks })
                .await
                .map_err(Error::from)?;
            Ok(())
        })
    }
}
