//! Read-only HTTP status API
//!
//! `GET /health` and `GET /status` on the status port. Playback control stays
//! on the command channel, where the master rule applies.

pub mod handlers;
pub mod server;

pub use server::{create_router, run, AppContext};
