// src/schedule/scheduler.rs

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::dag::WorkflowDefinition;
use crate::errors::{CrondagError, Result};
use crate::registry::WorkflowRegistry;
use crate::types::{RunKey, WorkflowId};

/// Decides which workflow runs are due.
///
/// It is responsible for:
/// - evaluating each workflow's cron schedule against "now"
/// - catchup: every missed instant since `start_date`, or only the latest
///   one when catchup is disabled (earlier misses are skipped for good)
/// - idempotence: each `(workflow, instant)` is handed out at most once
/// - manual run requests, under the same idempotence rule
///
/// Schedule instants at or before the latest due instant of a workflow are
/// settled: they either produced a run or were skipped for good. Settled
/// instants are dropped from memory and recognized through the schedule
/// itself, so memory stays bounded for long-lived processes.
#[derive(Debug)]
pub struct Scheduler {
    registry: WorkflowRegistry,
    /// Instants materialized and not yet settled, per workflow. Off-schedule
    /// (manual) instants are always kept.
    materialized: HashMap<WorkflowId, BTreeSet<DateTime<Utc>>>,
    /// Latest settled schedule instant per workflow.
    settled_until: HashMap<WorkflowId, DateTime<Utc>>,
    /// Latest `now` evaluated per workflow, so catchup does not rescan
    /// history on every tick.
    cursor: HashMap<WorkflowId, DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(registry: WorkflowRegistry) -> Self {
        Self {
            registry,
            materialized: HashMap::new(),
            settled_until: HashMap::new(),
            cursor: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Add or replace a definition.
    pub fn load(&mut self, def: WorkflowDefinition) {
        self.cursor.remove(&def.id);
        self.registry.load(def);
    }

    /// Replace every definition; workflows that disappear stop scheduling.
    pub fn reload(&mut self, defs: impl IntoIterator<Item = WorkflowDefinition>) {
        let removed = self.registry.reload(defs);
        for id in removed {
            self.materialized.remove(&id);
            self.settled_until.remove(&id);
        }
        self.cursor.clear();
    }

    pub fn unload(&mut self, id: &str) {
        self.registry.unload(id);
        self.cursor.remove(id);
        self.materialized.remove(id);
        self.settled_until.remove(id);
    }

    /// Remember runs that already exist (e.g. loaded from the run store) so
    /// they are never created twice.
    pub fn seed(&mut self, keys: impl IntoIterator<Item = RunKey>) {
        for key in keys {
            self.materialized
                .entry(key.workflow_id)
                .or_default()
                .insert(key.scheduled_for);
        }
    }

    /// Whether a run for `key` was already handed out (or its schedule
    /// instant was skipped for good).
    pub fn is_materialized(&self, key: &RunKey) -> bool {
        let held = self
            .materialized
            .get(&key.workflow_id)
            .is_some_and(|set| set.contains(&key.scheduled_for));
        held || self.is_settled(key)
    }

    /// Number of instants of `workflow_id` held in memory.
    pub fn retained(&self, workflow_id: &str) -> usize {
        self.materialized.get(workflow_id).map_or(0, BTreeSet::len)
    }

    fn is_settled(&self, key: &RunKey) -> bool {
        let Some(until) = self.settled_until.get(&key.workflow_id) else {
            return false;
        };
        key.scheduled_for <= *until
            && self.registry.get(&key.workflow_id).is_some_and(|def| {
                def.schedule
                    .as_ref()
                    .is_some_and(|schedule| schedule.contains(key.scheduled_for))
            })
    }

    /// All runs that became due at `now`, oldest first per workflow.
    pub fn due_runs(&mut self, now: DateTime<Utc>) -> Vec<RunKey> {
        let defs: Vec<_> = self.registry.iter().cloned().collect();
        let mut due = Vec::new();

        for def in defs {
            let from = match self.cursor.get(&def.id) {
                Some(last) if def.catchup => std::cmp::max(def.start_date, *last + Duration::seconds(1)),
                _ => def.start_date,
            };

            for instant in due_instants(&def, from, now) {
                let key = RunKey::new(def.id.clone(), instant);
                if self.mark(&key) {
                    info!(run = %key, "workflow run due");
                    due.push(key);
                }
            }

            self.cursor.insert(def.id.clone(), now);
            self.settle(&def, now);
        }

        due
    }

    /// Advance the settled watermark of `def` to its latest instant at or
    /// before `now` and drop the schedule instants it covers.
    fn settle(&mut self, def: &WorkflowDefinition, now: DateTime<Utc>) {
        let Some(schedule) = def.schedule.as_ref() else {
            return;
        };
        let Some(latest) = schedule.latest_between(def.start_date, now) else {
            return;
        };

        let until = self.settled_until.entry(def.id.clone()).or_insert(latest);
        *until = std::cmp::max(*until, latest);
        let until = *until;

        if let Some(set) = self.materialized.get_mut(&def.id) {
            set.retain(|t| *t > until || !schedule.contains(*t));
            debug!(workflow = %def.id, settled_until = %until, retained = set.len(), "settled schedule instants");
        }
    }

    /// Request a run of `workflow_id` at `scheduled_for` outside its schedule.
    ///
    /// Returns `Ok(None)` when that run already exists.
    pub fn request_run(
        &mut self,
        workflow_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<RunKey>> {
        if !self.registry.contains(workflow_id) {
            return Err(CrondagError::WorkflowNotFound(workflow_id.to_string()));
        }

        let key = RunKey::new(workflow_id, scheduled_for);
        if self.mark(&key) {
            info!(run = %key, "manual workflow run requested");
            Ok(Some(key))
        } else {
            debug!(run = %key, "run already exists; ignoring request");
            Ok(None)
        }
    }

    /// Record `key`; `false` if it was already materialized.
    fn mark(&mut self, key: &RunKey) -> bool {
        if self.is_settled(key) {
            return false;
        }
        self.materialized
            .entry(key.workflow_id.clone())
            .or_default()
            .insert(key.scheduled_for)
    }
}

/// Schedule instants of `def` in `[from, now]` that should produce runs.
///
/// With catchup every instant is returned; without it only the latest.
/// Workflows without a schedule never produce instants here.
pub fn due_instants(
    def: &WorkflowDefinition,
    from: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let Some(schedule) = def.schedule.as_ref() else {
        return Vec::new();
    };
    let from = std::cmp::max(from, def.start_date);

    if def.catchup {
        schedule.instants_between(from, now)
    } else {
        schedule
            .latest_between(def.start_date, now)
            .into_iter()
            .collect()
    }
}

/// Next instant strictly after `now` at which `def` will be due.
pub fn next_run_after(def: &WorkflowDefinition, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = def.schedule.as_ref()?;
    let after = std::cmp::max(now, def.start_date - Duration::seconds(1));
    schedule.next_after(after)
}
