//! Classroom configuration.
//!
//! TOML-based configuration for the relay server and classroom clients.
//! Every section has defaults so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    ClassroomConfig, ClientConfig, LogLevel, LoggingConfig, MediaConfig, RelayServerConfig,
    CONFIG_SCHEMA_VERSION,
};

use std::path::Path;

use classroom_common::ConfigError;

/// Load and validate config from `path`, or from the platform default
/// location when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ClassroomConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &ClassroomConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
