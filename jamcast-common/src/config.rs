//! Configuration file discovery and TOML loading
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (`JAMCAST_*`, wired through clap)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! This module covers step 3: locating the file and parsing it. Each binary
//! owns its own TOML schema and merges CLI overrides on top.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Logging section shared by every configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate the configuration file
///
/// An explicit path always wins, even if the file does not exist (loading it
/// then fails loudly). Otherwise `<config_dir>/jamcast/<file_name>` is used
/// when present.
pub fn resolve_config_path(explicit: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    dirs::config_dir()
        .map(|dir| dir.join("jamcast").join(file_name))
        .filter(|path| path.exists())
}

/// Parse a TOML file, or return defaults when no file is configured
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}
