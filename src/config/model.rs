// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::WorkflowDefinition;
use crate::errors::DefinitionError;
use crate::types::StoreMode;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// max_concurrency = 4
/// tick_interval = "30s"
///
/// [[workflow]]
/// id = "clue_metadata_ingestion"
/// schedule = "0 6 * * *"
/// start_date = "2024-01-01"
///
/// [workflow.default]
/// owner = "governance-team"
/// retries = 1
/// retry_delay = "5m"
///
/// [[workflow.task]]
/// id = "ingest_views"
/// cmd = "metadata ingest -c ingestion.yaml"
/// ```
///
/// All sections are optional and have reasonable defaults. Nothing here is
/// validated yet; see [`crate::config::validate`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All workflows from `[[workflow]]`, in file order.
    #[serde(default, rename = "workflow")]
    pub workflows: Vec<WorkflowConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Size of the worker pool.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How often schedules are evaluated, as a duration string.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,

    /// Root directory for the file run store.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub store: StoreMode,

    /// Shell command run once per notification.
    #[serde(default)]
    pub notify_cmd: Option<String>,
}

fn default_max_concurrency() -> usize {
    crate::exec::DEFAULT_MAX_CONCURRENCY
}

fn default_tick_interval() -> String {
    "30s".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".crondag")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            tick_interval: default_tick_interval(),
            state_dir: default_state_dir(),
            store: StoreMode::default(),
            notify_cmd: None,
        }
    }
}

/// `[[workflow]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// Cron expression or preset. Without one the workflow only runs on
    /// manual trigger.
    #[serde(default, alias = "schedule_interval")]
    pub schedule: Option<String>,

    /// RFC 3339 timestamp or `YYYY-MM-DD` (midnight UTC).
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub catchup: bool,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub max_active_runs: Option<usize>,

    /// `[workflow.default]`: policy inherited by every task.
    #[serde(default)]
    pub default: DefaultSection,

    /// `[[workflow.task]]` entries, in declaration order.
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

/// `[workflow.default]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default, alias = "email_on_failure")]
    pub alert_on_failure: Option<bool>,

    #[serde(default, alias = "email_on_retry")]
    pub alert_on_retry: Option<bool>,

    #[serde(default)]
    pub execution_timeout: Option<String>,

    /// Only `false` is supported.
    #[serde(default)]
    pub depends_on_past: bool,
}

/// `[[workflow.task]]` entry.
///
/// Every policy field is optional and overrides the workflow default for
/// this task only.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub id: String,

    /// The command to execute.
    pub cmd: String,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default, alias = "email_on_failure")]
    pub alert_on_failure: Option<bool>,

    #[serde(default, alias = "email_on_retry")]
    pub alert_on_retry: Option<bool>,

    #[serde(default)]
    pub execution_timeout: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Validated global settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_concurrency: usize,
    pub tick_interval: Duration,
    pub state_dir: PathBuf,
    pub store: StoreMode,
    pub notify_cmd: Option<String>,
}

/// Result of loading a config file: the validated settings, every workflow
/// that built successfully, and the rejected ones.
///
/// A rejected workflow never reaches the scheduler; the others keep serving.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: Settings,
    pub definitions: Vec<WorkflowDefinition>,
    pub rejected: Vec<DefinitionError>,
}

impl LoadedConfig {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}
