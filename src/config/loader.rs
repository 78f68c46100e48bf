// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::model::{LoadedConfig, RawConfigFile};
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** build or
/// validate workflows. Use [`load_definitions`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse_str(&contents)
}

/// Deserialize config text.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file and build every workflow in it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Validates `[config]` (hard error on failure).
/// - Builds each `[[workflow]]` through `WorkflowBuilder`, collecting the
///   ones that fail (cycles, bad schedules, unknown `after` references, ...)
///   instead of aborting.
pub fn load_definitions(path: impl AsRef<Path>) -> Result<LoadedConfig> {
    let raw = load_from_path(&path)?;
    validate_config(raw)
}
