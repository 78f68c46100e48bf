// src/errors.rs

//! Crate-wide error types.
//!
//! - [`DefinitionError`] is raised while building a workflow definition; the
//!   definition is rejected but the process keeps serving the others.
//! - [`WorkflowFailure`] describes a run that ended `Failed`. It is reported,
//!   never retried at the workflow level.
//! - [`CrondagError`] aggregates everything else (config, IO, parsing).

use thiserror::Error;

use crate::types::RunKey;

/// Load-time problems with a single workflow definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("workflow '{workflow}': cyclic dependency between tasks [{}]", cycle.join(", "))]
    CyclicDependency { workflow: String, cycle: Vec<String> },

    #[error("workflow '{workflow}': invalid schedule '{expression}': {reason}")]
    InvalidSchedule {
        workflow: String,
        expression: String,
        reason: String,
    },

    #[error("workflow '{workflow}': duplicate task id '{task}'")]
    DuplicateTaskId { workflow: String, task: String },

    #[error("workflow '{workflow}': task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        workflow: String,
        task: String,
        dependency: String,
    },

    #[error("workflow '{workflow}' has no tasks")]
    EmptyWorkflow { workflow: String },

    #[error("duplicate workflow id '{0}'")]
    DuplicateWorkflowId(String),

    #[error("workflow '{workflow}': {message}")]
    Invalid { workflow: String, message: String },
}

impl DefinitionError {
    /// Id of the workflow the error belongs to.
    pub fn workflow(&self) -> &str {
        match self {
            DefinitionError::CyclicDependency { workflow, .. }
            | DefinitionError::InvalidSchedule { workflow, .. }
            | DefinitionError::DuplicateTaskId { workflow, .. }
            | DefinitionError::UnknownDependency { workflow, .. }
            | DefinitionError::EmptyWorkflow { workflow }
            | DefinitionError::Invalid { workflow, .. } => workflow,
            DefinitionError::DuplicateWorkflowId(workflow) => workflow,
        }
    }
}

/// Terminal failure of a workflow run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("workflow run {run} failed; failed tasks: [{}]", failed_tasks.join(", "))]
pub struct WorkflowFailure {
    pub run: RunKey,
    /// Tasks that failed on their own (upstream-skipped tasks excluded).
    pub failed_tasks: Vec<String>,
}

#[derive(Error, Debug)]
pub enum CrondagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CrondagError>;
