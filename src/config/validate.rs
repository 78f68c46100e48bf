// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::config::model::{
    ConfigSection, DefaultSection, LoadedConfig, RawConfigFile, Settings, TaskConfig,
    WorkflowConfig,
};
use crate::dag::definition::DEFAULT_RETRY_DELAY;
use crate::dag::{PolicyOverrides, RetryPolicy, TaskPolicy, TaskSpec, WorkflowBuilder, WorkflowDefinition};
use crate::errors::{CrondagError, DefinitionError, Result};
use crate::types::parse_duration;

/// Validate a raw config file.
///
/// Problems in `[config]` are hard errors. Problems in a single workflow
/// reject that workflow only; it is logged and reported in
/// [`LoadedConfig::rejected`].
pub fn validate_config(raw: RawConfigFile) -> Result<LoadedConfig> {
    let settings = validate_settings(&raw.config)?;

    let mut seen = HashSet::new();
    let mut definitions = Vec::new();
    let mut rejected = Vec::new();

    for wf in raw.workflows.iter() {
        if !seen.insert(wf.id.clone()) {
            let err = DefinitionError::DuplicateWorkflowId(wf.id.clone());
            warn!(workflow = %wf.id, error = %err, "rejecting workflow definition");
            rejected.push(err);
            continue;
        }

        match build_workflow(wf) {
            Ok(def) => definitions.push(def),
            Err(err) => {
                warn!(workflow = %wf.id, error = %err, "rejecting workflow definition");
                rejected.push(err);
            }
        }
    }

    Ok(LoadedConfig {
        settings,
        definitions,
        rejected,
    })
}

fn validate_settings(cfg: &ConfigSection) -> Result<Settings> {
    if cfg.max_concurrency == 0 {
        return Err(CrondagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    let tick_interval = parse_duration(&cfg.tick_interval)
        .map_err(|e| CrondagError::ConfigError(format!("[config].tick_interval: {e}")))?;
    if tick_interval.is_zero() {
        return Err(CrondagError::ConfigError(
            "[config].tick_interval must be greater than zero".to_string(),
        ));
    }

    Ok(Settings {
        max_concurrency: cfg.max_concurrency,
        tick_interval,
        state_dir: cfg.state_dir.clone(),
        store: cfg.store,
        notify_cmd: cfg.notify_cmd.clone(),
    })
}

/// Turn one `[[workflow]]` entry into a definition through the builder.
pub fn build_workflow(wf: &WorkflowConfig) -> std::result::Result<WorkflowDefinition, DefinitionError> {
    let invalid = |message: String| DefinitionError::Invalid {
        workflow: wf.id.clone(),
        message,
    };

    if wf.default.depends_on_past {
        return Err(invalid("depends_on_past = true is not supported".to_string()));
    }

    let default_policy = default_policy(&wf.default).map_err(&invalid)?;

    let mut builder = WorkflowBuilder::new(wf.id.clone())
        .description(wf.description.clone())
        .default_policy(default_policy)
        .catchup(wf.catchup);

    if let Some(expr) = wf.schedule.as_deref() {
        builder = builder.schedule(expr);
    }
    if let Some(raw) = wf.start_date.as_deref() {
        let start = parse_start_date(raw).map_err(|e| invalid(format!("start_date: {e}")))?;
        builder = builder.start_date(start);
    }
    if let Some(max) = wf.max_active_runs {
        builder = builder.max_active_runs(max);
    }
    for tag in wf.tags.iter() {
        builder = builder.tag(tag.clone());
    }

    for task in wf.tasks.iter() {
        let spec = task_spec(task).map_err(|e| invalid(format!("task '{}': {e}", task.id)))?;
        builder = builder.task(spec);
    }

    builder.build()
}

fn default_policy(section: &DefaultSection) -> std::result::Result<TaskPolicy, String> {
    Ok(TaskPolicy {
        owner: section.owner.clone().unwrap_or_default(),
        retry: RetryPolicy {
            max_retries: section.retries.unwrap_or(0),
            retry_delay: optional_duration(section.retry_delay.as_deref(), "retry_delay")?
                .unwrap_or(DEFAULT_RETRY_DELAY),
            alert_on_failure: section.alert_on_failure.unwrap_or(false),
            alert_on_retry: section.alert_on_retry.unwrap_or(false),
        },
        execution_timeout: optional_duration(
            section.execution_timeout.as_deref(),
            "execution_timeout",
        )?,
    })
}

fn task_spec(task: &TaskConfig) -> std::result::Result<TaskSpec, String> {
    let overrides = PolicyOverrides {
        owner: task.owner.clone(),
        max_retries: task.retries,
        retry_delay: optional_duration(task.retry_delay.as_deref(), "retry_delay")?,
        alert_on_failure: task.alert_on_failure,
        alert_on_retry: task.alert_on_retry,
        execution_timeout: optional_duration(task.execution_timeout.as_deref(), "execution_timeout")?,
    };

    let mut spec = TaskSpec::new(task.id.clone(), task.cmd.clone()).overrides(overrides);
    for dep in task.after.iter() {
        spec = spec.after(dep.clone());
    }
    for (key, value) in task.env.iter() {
        spec = spec.env(key.clone(), value.clone());
    }
    Ok(spec)
}

fn optional_duration(raw: Option<&str>, field: &str) -> std::result::Result<Option<Duration>, String> {
    raw.map(|s| parse_duration(s).map_err(|e| format!("{field}: {e}")))
        .transpose()
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_start_date(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))
}
