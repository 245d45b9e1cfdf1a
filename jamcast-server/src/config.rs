//! Server configuration
//!
//! Loaded from `server.toml` (see `jamcast_common::config`), then overridden
//! by command-line arguments and `JAMCAST_*` environment variables in `main`.

use crate::error::{Error, Result};
use jamcast_common::config::{load_toml, resolve_config_path, LoggingConfig};
use jamcast_common::wire::{CHUNK_SAMPLES, MAX_CHUNK_SAMPLES};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "server.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub audio_port: u16,
    pub command_port: u16,
    /// HTTP status port; 0 disables the status API
    pub status_port: u16,
    pub music_folder: PathBuf,
    /// Track file extension, without the dot
    pub extension: String,
    /// Samples per streamed chunk
    pub chunk_samples: usize,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            audio_port: 5050,
            command_port: 5051,
            status_port: 5052,
            music_folder: PathBuf::from("Music"),
            extension: "mp3".to_string(),
            chunk_samples: CHUNK_SAMPLES,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load `explicit`, or the default config file if present, or built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit, CONFIG_FILE_NAME);
        load_toml(path.as_deref()).map_err(|e| match e {
            jamcast_common::Error::Config(msg) => Error::Config(msg),
            other => Error::Protocol(other),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_samples == 0 || self.chunk_samples > MAX_CHUNK_SAMPLES {
            return Err(Error::Config(format!(
                "chunk_samples must be between 1 and {}, got {}",
                MAX_CHUNK_SAMPLES, self.chunk_samples
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(Error::Config("extension must not be empty".to_string()));
        }
        if self.audio_port == self.command_port {
            return Err(Error::Config(format!(
                "audio_port and command_port are both {}",
                self.audio_port
            )));
        }
        self.audio_addr()?;
        Ok(())
    }

    pub fn audio_addr(&self) -> Result<SocketAddr> {
        self.addr(self.audio_port)
    }

    pub fn command_addr(&self) -> Result<SocketAddr> {
        self.addr(self.command_port)
    }

    /// `None` when the status API is disabled
    pub fn status_addr(&self) -> Result<Option<SocketAddr>> {
        if self.status_port == 0 {
            return Ok(None);
        }
        self.addr(self.status_port).map(Some)
    }

    fn addr(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", self.bind_address, e)))
    }
}
