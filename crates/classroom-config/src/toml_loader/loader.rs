//! Reading and parsing config files.

use std::io::ErrorKind;
use std::path::Path;

use classroom_common::ConfigError;
use tracing::{info, warn};

use crate::schema::ClassroomConfig;
use crate::validation;

use super::paths::{create_default_config, default_config_path};

/// Parse the TOML file at `path`.
///
/// Missing fields take their serde defaults. Out-of-range values only log
/// a warning here; `crate::load_config` is the strict entry point.
pub fn load_from_path(path: &Path) -> Result<ClassroomConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
        _ => ConfigError::ParseError(format!("cannot read {}: {e}", path.display())),
    })?;

    let config = parse(&content)?;
    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), "config has invalid values: {e}");
    }

    info!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Parse config from a TOML string.
pub fn parse(content: &str) -> Result<ClassroomConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load from [`default_config_path`], writing the commented default file
/// first when there is none.
pub fn load_default() -> Result<ClassroomConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            create_default_config(&path)?;
            Ok(ClassroomConfig::default())
        }
        other => other,
    }
}
