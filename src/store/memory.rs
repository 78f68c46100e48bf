// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::dag::WorkflowRun;
use crate::store::RunStore;
use crate::types::RunKey;

/// Stores runs in memory only.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<BTreeMap<RunKey, WorkflowRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn save(&self, run: &WorkflowRun) -> Result<()> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| anyhow!("run store lock poisoned"))?;
        runs.insert(run.key.clone(), run.clone());
        debug!(run = %run.key, state = ?run.state, "stored run (memory)");
        Ok(())
    }

    fn get(&self, key: &RunKey) -> Result<Option<WorkflowRun>> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| anyhow!("run store lock poisoned"))?;
        Ok(runs.get(key).cloned())
    }

    fn list(&self, workflow_id: Option<&str>) -> Result<Vec<WorkflowRun>> {
        let runs = self
            .runs
            .lock()
            .map_err(|_| anyhow!("run store lock poisoned"))?;
        Ok(runs
            .values()
            .filter(|run| workflow_id.is_none_or(|id| run.key.workflow_id == id))
            .cloned()
            .collect())
    }
}
