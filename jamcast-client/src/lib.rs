//! # JamCast Client Library (jamcast-client)
//!
//! Listens to a JamCast broadcast and optionally acts as its remote control.
//!
//! **Architecture:**
//! - `receiver`: audio port reader, fills the jitter buffer
//! - `jitter`: bounded lock-free SPSC sample queue with backpressure
//! - `engine`: real-time render step, silence on pause or starvation
//! - `output`: devices that clock the engine (headless, cpal)
//! - `commands` + `flags`: control channel and the local playback flags it drives

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod jitter;
pub mod output;
pub mod receiver;

pub use error::{Error, Result};
