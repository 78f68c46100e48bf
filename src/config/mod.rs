// src/config/mod.rs

//! Configuration loading and validation for crondag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate `[config]` and turn each `[[workflow]]` into a
//!   `WorkflowDefinition`, rejecting broken ones (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_definitions, load_from_path, parse_str};
pub use model::{
    ConfigSection, DefaultSection, LoadedConfig, RawConfigFile, Settings, TaskConfig,
    WorkflowConfig,
};
pub use validate::validate_config;
