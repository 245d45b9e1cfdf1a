//! Error types for jamcast-server
//!
//! Per-connection faults (`Io`, `Protocol`) never leave the task that owns the
//! connection; `EmptyLibrary` and `Config` are fatal at start-up.

use thiserror::Error;

/// Main error type for the broadcast server
#[derive(Error, Debug)]
pub enum Error {
    /// No playable track in the music folder
    #[error("No playable tracks found in {0}")]
    EmptyLibrary(String),

    /// External decoder could not produce samples for a track
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Connection reset, broken pipe or other socket failure
    #[error("Connection fault: {0}")]
    Io(#[from] std::io::Error),

    /// Wire codec or command vocabulary error
    #[error(transparent)]
    Protocol(#[from] jamcast_common::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type using jamcast-server Error
pub type Result<T> = std::result::Result<T, Error>;
