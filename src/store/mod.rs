// src/store/mod.rs

//! Persistence of workflow run records.
//!
//! Every run transition is written through a [`RunStore`] so that in-flight
//! runs survive a restart and external tools can query run status.
//!
//! - [`FileRunStore`] keeps one JSON document per run on disk.
//! - [`MemoryRunStore`] keeps runs in memory only (tests, `store = "memory"`).

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::dag::WorkflowRun;
use crate::types::{RunKey, StoreMode};

pub mod file;
pub mod memory;

pub use file::FileRunStore;
pub use memory::MemoryRunStore;

/// Abstract storage for workflow runs.
///
/// Implementations use interior mutability so one store can be shared
/// between the runtime (writer) and status queries (readers).
pub trait RunStore: Send + Sync {
    /// Insert or overwrite the record for `run.key`.
    fn save(&self, run: &WorkflowRun) -> Result<()>;
    fn get(&self, key: &RunKey) -> Result<Option<WorkflowRun>>;
    /// All runs, optionally restricted to one workflow, oldest first.
    fn list(&self, workflow_id: Option<&str>) -> Result<Vec<WorkflowRun>>;
}

/// Build the store selected in `[config]`.
pub fn open_store(mode: StoreMode, state_dir: &Path) -> Result<Arc<dyn RunStore>> {
    Ok(match mode {
        StoreMode::File => Arc::new(FileRunStore::open(state_dir)?),
        StoreMode::Memory => Arc::new(MemoryRunStore::new()),
    })
}
