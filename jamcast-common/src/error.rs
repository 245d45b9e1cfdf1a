//! Common error types for JamCast

use thiserror::Error;

/// Common result type for JamCast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the server and client
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (connection reset, broken pipe, short read)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio frame could not be decompressed or decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Control token outside the command vocabulary
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}
