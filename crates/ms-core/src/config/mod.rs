//! Configuration management for mqtt-shell
//!
//! Values are layered: built-in defaults, then an optional TOML file, then a
//! `.env` file, then the process environment. The result is an explicit
//! [`ShellConfig`] value handed to constructors; nothing below the binaries
//! reads the environment.

mod serde_utils;
mod shell;

pub use serde_utils::duration_secs;
pub use shell::{Role, ShellConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mqtt-shell")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load a `.env` file into the process environment.
///
/// Variables already set in the environment win. With no explicit path the
/// current directory and its ancestors are searched, and a missing file is
/// not an error. Returns the path that was loaded, if any.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            dotenvy::from_path(path)
                .map_err(|e| ConfigError::Invalid(format!("Failed to load {:?}: {}", path, e)))?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(ConfigError::Invalid(format!("Failed to load .env: {}", e))),
        },
    }
}
