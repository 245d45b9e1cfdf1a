//! Local playback flags
//!
//! Written by the command sender and the echo listener, read by the output
//! callback on every render. Plain atomics, so the real-time thread never
//! waits on them.

use jamcast_common::Command;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct PlaybackFlags {
    playing: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl Default for PlaybackFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackFlags {
    /// Not playing, paused, not stopped
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            paused: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Mirror a transport command locally
    pub fn apply(&self, command: Command) {
        match command {
            Command::Play | Command::Resume | Command::Next => {
                self.playing.store(true, Ordering::Release);
                self.paused.store(false, Ordering::Release);
            }
            Command::Pause => self.paused.store(true, Ordering::Release),
            Command::Quit | Command::Shutdown => self.stopped.store(true, Ordering::Release),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether the output should pull audio from the jitter buffer
    pub fn audible(&self) -> bool {
        self.is_playing() && !self.is_paused() && !self.is_stopped()
    }
}
