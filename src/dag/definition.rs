// src/dag/definition.rs

//! Workflow and task definitions plus the builder used to construct them.
//!
//! A [`WorkflowDefinition`] can only be obtained through
//! [`WorkflowBuilder::build`], which validates task ids, dependencies, the
//! schedule expression and acyclicity. Definitions are immutable afterwards
//! and are shared between runs behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::dag::graph::{DagGraph, GraphError};
use crate::errors::DefinitionError;
use crate::schedule::CronSchedule;
use crate::types::{TaskName, WorkflowId};

/// Fallback retry delay when neither the workflow nor the task sets one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Fallback for `max_active_runs`.
pub const DEFAULT_MAX_ACTIVE_RUNS: usize = 16;

/// Retry and alerting behaviour of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt; `0` means one attempt.
    pub max_retries: u32,
    /// Minimum wait between a failed attempt and the next one.
    pub retry_delay: Duration,
    pub alert_on_failure: bool,
    pub alert_on_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            alert_on_failure: false,
            alert_on_retry: false,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { next_attempt: u32, delay: Duration },
    GiveUp,
}

impl RetryPolicy {
    /// Decide based on the attempt number that just failed (0-based).
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt < self.max_retries {
            RetryDecision::Retry {
                next_attempt: attempt + 1,
                delay: self.retry_delay,
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}

/// Effective policy of a task: the workflow default with the task's
/// overrides applied field by field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskPolicy {
    pub owner: String,
    pub retry: RetryPolicy,
    pub execution_timeout: Option<Duration>,
}

/// Optional per-field overrides. `None` means "inherit".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyOverrides {
    pub owner: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub alert_on_failure: Option<bool>,
    pub alert_on_retry: Option<bool>,
    pub execution_timeout: Option<Duration>,
}

impl PolicyOverrides {
    /// Overlay these overrides onto `base`.
    pub fn apply(&self, base: &TaskPolicy) -> TaskPolicy {
        TaskPolicy {
            owner: self.owner.clone().unwrap_or_else(|| base.owner.clone()),
            retry: RetryPolicy {
                max_retries: self.max_retries.unwrap_or(base.retry.max_retries),
                retry_delay: self.retry_delay.unwrap_or(base.retry.retry_delay),
                alert_on_failure: self.alert_on_failure.unwrap_or(base.retry.alert_on_failure),
                alert_on_retry: self.alert_on_retry.unwrap_or(base.retry.alert_on_retry),
            },
            execution_timeout: self.execution_timeout.or(base.execution_timeout),
        }
    }
}

/// A single task of a workflow.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub id: TaskName,
    /// Opaque command handed to the task executor.
    pub command: String,
    /// Effective policy (already merged with the workflow default).
    pub policy: TaskPolicy,
    pub depends_on: BTreeSet<TaskName>,
    /// Extra environment variables for the executor.
    pub env: BTreeMap<String, String>,
}

/// A validated, immutable workflow.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub description: String,
    pub default_policy: TaskPolicy,
    /// `None` means the workflow only runs when triggered manually.
    pub schedule: Option<CronSchedule>,
    pub start_date: DateTime<Utc>,
    pub catchup: bool,
    pub tags: BTreeSet<String>,
    pub max_active_runs: usize,
    tasks: Vec<TaskDefinition>,
    index: HashMap<TaskName, usize>,
    graph: DagGraph,
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<WorkflowId>) -> WorkflowBuilder {
        WorkflowBuilder::new(id)
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }
}

/// Builder-side description of a task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    id: TaskName,
    command: String,
    overrides: PolicyOverrides,
    depends_on: Vec<TaskName>,
    env: BTreeMap<String, String>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskName>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            overrides: PolicyOverrides::default(),
            depends_on: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    pub fn overrides(mut self, overrides: PolicyOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.overrides.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.overrides.retry_delay = Some(delay);
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.overrides.owner = Some(owner.into());
        self
    }

    pub fn alert_on_failure(mut self, val: bool) -> Self {
        self.overrides.alert_on_failure = Some(val);
        self
    }

    pub fn alert_on_retry(mut self, val: bool) -> Self {
        self.overrides.alert_on_retry = Some(val);
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.overrides.execution_timeout = Some(timeout);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Explicit graph-construction API for workflows.
///
/// ```
/// use crondag::dag::{WorkflowBuilder, TaskSpec};
///
/// let def = WorkflowBuilder::new("ingest")
///     .schedule("0 6 * * *")
///     .task(TaskSpec::new("extract", "echo extract"))
///     .task(TaskSpec::new("load", "echo load"))
///     .edge("extract", "load")
///     .build()
///     .unwrap();
/// assert_eq!(def.graph().dependencies_of("load"), ["extract".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    id: WorkflowId,
    description: String,
    default_policy: TaskPolicy,
    schedule: Option<String>,
    start_date: DateTime<Utc>,
    catchup: bool,
    tags: BTreeSet<String>,
    max_active_runs: usize,
    tasks: Vec<TaskSpec>,
    edges: Vec<(TaskName, TaskName)>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<WorkflowId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            default_policy: TaskPolicy::default(),
            schedule: None,
            start_date: DateTime::<Utc>::UNIX_EPOCH,
            catchup: false,
            tags: BTreeSet::new(),
            max_active_runs: DEFAULT_MAX_ACTIVE_RUNS,
            tasks: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_policy(mut self, policy: TaskPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn schedule(mut self, expression: impl Into<String>) -> Self {
        self.schedule = Some(expression.into());
        self
    }

    pub fn start_date(mut self, start: DateTime<Utc>) -> Self {
        self.start_date = start;
        self
    }

    pub fn catchup(mut self, catchup: bool) -> Self {
        self.catchup = catchup;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn max_active_runs(mut self, max: usize) -> Self {
        self.max_active_runs = max;
        self
    }

    /// Add a task.
    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add a dependency edge: `downstream` runs after `upstream` succeeded.
    pub fn edge(mut self, upstream: impl Into<TaskName>, downstream: impl Into<TaskName>) -> Self {
        self.edges.push((upstream.into(), downstream.into()));
        self
    }

    /// Add edges `a -> b -> c ...` for a linear chain.
    pub fn chain<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        for pair in ids.windows(2) {
            self.edges
                .push((pair[0].as_ref().to_string(), pair[1].as_ref().to_string()));
        }
        self
    }

    /// Validate and freeze the workflow.
    pub fn build(self) -> Result<WorkflowDefinition, DefinitionError> {
        let workflow = self.id.clone();

        if self.tasks.is_empty() {
            return Err(DefinitionError::EmptyWorkflow { workflow });
        }
        if self.max_active_runs == 0 {
            return Err(DefinitionError::Invalid {
                workflow,
                message: "max_active_runs must be >= 1".to_string(),
            });
        }

        let schedule = match self.schedule.as_deref() {
            Some(expr) => Some(CronSchedule::parse(expr).map_err(|reason| {
                DefinitionError::InvalidSchedule {
                    workflow: workflow.clone(),
                    expression: expr.to_string(),
                    reason,
                }
            })?),
            None => None,
        };

        let mut seen: HashSet<&str> = HashSet::new();
        for task in self.tasks.iter() {
            if !seen.insert(task.id.as_str()) {
                return Err(DefinitionError::DuplicateTaskId {
                    workflow,
                    task: task.id.clone(),
                });
            }
        }

        // Merge `after` lists and explicit edges into one dependency set per task.
        let mut deps: HashMap<&str, BTreeSet<TaskName>> = self
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), t.depends_on.iter().cloned().collect()))
            .collect();

        for (upstream, downstream) in self.edges.iter() {
            match deps.get_mut(downstream.as_str()) {
                Some(set) => {
                    set.insert(upstream.clone());
                }
                None => {
                    return Err(DefinitionError::Invalid {
                        workflow,
                        message: format!(
                            "edge '{upstream}' -> '{downstream}' references unknown task '{downstream}'"
                        ),
                    });
                }
            }
        }

        let graph = DagGraph::build(self.tasks.iter().map(|t| {
            let task_deps = &deps[t.id.as_str()];
            (t.id.as_str(), task_deps.iter().map(String::as_str))
        }))
        .map_err(|err| match err {
            GraphError::UnknownDependency { task, dependency } => {
                DefinitionError::UnknownDependency {
                    workflow: workflow.clone(),
                    task,
                    dependency,
                }
            }
            GraphError::Cycle(cycle) => DefinitionError::CyclicDependency {
                workflow: workflow.clone(),
                cycle,
            },
        })?;

        let tasks: Vec<TaskDefinition> = self
            .tasks
            .iter()
            .map(|spec| TaskDefinition {
                id: spec.id.clone(),
                command: spec.command.clone(),
                policy: spec.overrides.apply(&self.default_policy),
                depends_on: deps[spec.id.as_str()].clone(),
                env: spec.env.clone(),
            })
            .collect();

        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        Ok(WorkflowDefinition {
            id: self.id,
            description: self.description,
            default_policy: self.default_policy,
            schedule,
            start_date: self.start_date,
            catchup: self.catchup,
            tags: self.tags,
            max_active_runs: self.max_active_runs,
            tasks,
            index,
            graph,
        })
    }
}
