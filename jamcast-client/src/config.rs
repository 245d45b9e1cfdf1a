//! Client configuration
//!
//! Loaded from `client.toml` (see `jamcast_common::config`), then overridden
//! by command-line arguments and `JAMCAST_*` environment variables in `main`.

use crate::error::{Error, Result};
use jamcast_common::config::{load_toml, resolve_config_path, LoggingConfig};
use jamcast_common::wire::CHUNK_SAMPLES;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "client.toml";

/// Where rendered audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Clock-driven sink that discards audio
    Headless,
    /// Default sound card (requires the `cpal` feature)
    Cpal,
}

/// TOML configuration file structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_host: String,
    pub audio_port: u16,
    pub command_port: u16,
    /// Jitter buffer size in samples
    pub jitter_capacity: usize,
    /// Samples rendered per output callback
    pub output_frames: usize,
    pub output: OutputKind,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            audio_port: 5050,
            command_port: 5051,
            jitter_capacity: CHUNK_SAMPLES * 10,
            output_frames: 1024,
            output: if cfg!(feature = "cpal") {
                OutputKind::Cpal
            } else {
                OutputKind::Headless
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit, CONFIG_FILE_NAME);
        load_toml(path.as_deref()).map_err(|e| match e {
            jamcast_common::Error::Config(msg) => Error::Config(msg),
            other => Error::Protocol(other),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.jitter_capacity == 0 {
            return Err(Error::Config("jitter_capacity must be non-zero".to_string()));
        }
        if self.output_frames == 0 || self.output_frames > self.jitter_capacity {
            return Err(Error::Config(format!(
                "output_frames must be between 1 and jitter_capacity ({}), got {}",
                self.jitter_capacity, self.output_frames
            )));
        }
        if self.server_host.trim().is_empty() {
            return Err(Error::Config("server_host must not be empty".to_string()));
        }
        if self.output == OutputKind::Cpal && !cfg!(feature = "cpal") {
            return Err(Error::Config(
                "output = \"cpal\" needs a build with the `cpal` feature".to_string(),
            ));
        }
        Ok(())
    }

    pub fn audio_endpoint(&self) -> String {
        format!("{}:{}", self.server_host, self.audio_port)
    }

    pub fn command_endpoint(&self) -> String {
        format!("{}:{}", self.server_host, self.command_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.jitter_capacity, 20_480);
        assert_eq!(config.output_frames, 1024);
        assert_eq!(config.audio_endpoint(), "127.0.0.1:5050");
        assert_eq!(config.command_endpoint(), "127.0.0.1:5051");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server_host = \"10.0.0.7\"\noutput = \"headless\"\njitter_capacity = 4096"
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server_host, "10.0.0.7");
        assert_eq!(config.output, OutputKind::Headless);
        assert_eq!(config.jitter_capacity, 4096);
        assert_eq!(config.command_port, 5051);
    }

    #[test]
    fn test_output_frames_must_fit_buffer() {
        let config = ClientConfig {
            output: OutputKind::Headless,
            jitter_capacity: 512,
            output_frames: 1024,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_output_kind_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output = \"speakers\"").unwrap();
        assert!(matches!(
            ClientConfig::load(Some(file.path())),
            Err(Error::Config(_))
        ));
    }
}
