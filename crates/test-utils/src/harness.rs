use std::sync::Arc;

use crondag::dag::WorkflowDefinition;
use crondag::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeHandle, RuntimeOptions};
use crondag::exec::WorkerPool;
use crondag::registry::WorkflowRegistry;
use crondag::schedule::Scheduler;
use crondag::store::{MemoryRunStore, RunStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fake_executor::ScriptedExecutor;
use crate::notifier::RecordingNotifier;

/// A full runtime (core, shell, worker pool) around a [`ScriptedExecutor`],
/// running on a background Tokio task.
pub struct Harness {
    pub handle: RuntimeHandle,
    pub executor: Arc<ScriptedExecutor>,
    pub store: Arc<dyn RunStore>,
    pub notifier: Arc<RecordingNotifier>,
    join: Option<JoinHandle<crondag::errors::Result<()>>>,
}

impl Harness {
    /// Start with an in-memory run store.
    pub fn start(
        defs: Vec<WorkflowDefinition>,
        executor: ScriptedExecutor,
        options: RuntimeOptions,
    ) -> Self {
        Self::start_with_store(defs, executor, Arc::new(MemoryRunStore::new()), options)
    }

    pub fn start_with_store(
        defs: Vec<WorkflowDefinition>,
        executor: ScriptedExecutor,
        store: Arc<dyn RunStore>,
        options: RuntimeOptions,
    ) -> Self {
        let executor = Arc::new(executor);
        let notifier = Arc::new(RecordingNotifier::new());

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let pool = WorkerPool::new(executor.clone(), 4, tx.clone());
        let core = CoreRuntime::new(Scheduler::new(WorkflowRegistry::from_definitions(defs)), options);
        let runtime = Runtime::new(core, rx, &tx, pool, store.clone(), notifier.clone());

        let join = tokio::spawn(runtime.run());

        Self {
            handle: RuntimeHandle::new(tx),
            executor,
            store,
            notifier,
            join: Some(join),
        }
    }

    /// Wait for the runtime loop to exit.
    pub async fn wait(&mut self) -> crondag::errors::Result<()> {
        match self.join.take() {
            Some(join) => join.await.expect("runtime task panicked"),
            None => Ok(()),
        }
    }
}
