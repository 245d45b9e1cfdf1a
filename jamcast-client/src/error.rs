//! Error types for jamcast-client

use thiserror::Error;

/// Main error type for the listening client
#[derive(Error, Debug)]
pub enum Error {
    /// Connection refused, reset or closed mid-frame
    #[error("Connection fault: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed audio frame or unknown control token
    #[error(transparent)]
    Protocol(#[from] jamcast_common::Error),

    /// Audio device could not be opened or failed while running
    #[error("Audio output error: {0}")]
    Output(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type using jamcast-client Error
pub type Result<T> = std::result::Result<T, Error>;
