//! # JamCast Server Library (jamcast-server)
//!
//! Shared listening session: one playlist, one playback clock, any number of
//! listeners hearing the same position.
//!
//! **Architecture:**
//! - `playlist` + `loader`: track enumeration and decoding (symphonia)
//! - `clock`: the single (state, position) record all listeners read
//! - `session`: transition operations over clock + playlist
//! - `streamer`: audio port, one paced streaming task per listener
//! - `authority`: control port, master election and command fan-out (actor)
//! - `console`, `api`: operator shutdown and read-only HTTP status

pub mod api;
pub mod authority;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod loader;
pub mod pacing;
pub mod playlist;
pub mod session;
pub mod streamer;

pub use error::{Error, Result};
pub use session::Session;
