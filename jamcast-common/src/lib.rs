//! # JamCast Common Library
//!
//! Shared code for the JamCast server and client:
//! - Error type used by the wire and command codecs
//! - Audio wire format (sample-rate header, length-prefixed compressed chunks)
//! - Command vocabulary and line framing for the control channel
//! - Playback state enum
//! - Configuration file discovery and tracing initialization

pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod state;
pub mod wire;

pub use command::Command;
pub use error::{Error, Result};
pub use state::PlaybackState;
