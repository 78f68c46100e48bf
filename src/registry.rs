// src/registry.rs

//! Explicit registry of loaded workflow definitions.
//!
//! There is no global registration: the registry is built at startup (from
//! a config file or the builder API) and handed to the scheduler, which
//! exposes `load`, `reload` and `unload` on top of it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::dag::WorkflowDefinition;
use crate::types::WorkflowId;

#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<WorkflowId, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(defs: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let mut registry = Self::new();
        for def in defs {
            registry.load(def);
        }
        registry
    }

    /// Add or replace a definition by id. Returns the replaced definition.
    pub fn load(&mut self, def: WorkflowDefinition) -> Option<Arc<WorkflowDefinition>> {
        let id = def.id.clone();
        let previous = self.workflows.insert(id.clone(), Arc::new(def));
        if previous.is_some() {
            info!(workflow = %id, "workflow definition replaced");
        } else {
            info!(workflow = %id, "workflow definition loaded");
        }
        previous
    }

    /// Replace the whole set. Returns the ids that are no longer defined.
    pub fn reload(&mut self, defs: impl IntoIterator<Item = WorkflowDefinition>) -> Vec<WorkflowId> {
        let fresh = Self::from_definitions(defs);
        let removed: Vec<WorkflowId> = self
            .workflows
            .keys()
            .filter(|id| !fresh.workflows.contains_key(*id))
            .cloned()
            .collect();
        self.workflows = fresh.workflows;
        info!(
            loaded = self.workflows.len(),
            removed = removed.len(),
            "workflow registry reloaded"
        );
        removed
    }

    pub fn unload(&mut self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        let removed = self.workflows.remove(id);
        if removed.is_some() {
            info!(workflow = %id, "workflow definition unloaded");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkflowDefinition>> {
        self.workflows.values()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
