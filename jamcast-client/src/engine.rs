//! Real-time playback engine
//!
//! `render` is called from the output callback. It either copies exactly one
//! buffer's worth of samples out of the jitter buffer or writes silence; it
//! never blocks, awaits or touches the network.

use crate::flags::PlaybackFlags;
use crate::jitter::{JitterConsumer, JitterStats};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a render call produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendered {
    Audio,
    /// Not playing or paused
    Idle,
    /// Playing but the jitter buffer was short
    Underrun,
}

pub struct ClientPlaybackEngine {
    consumer: JitterConsumer,
    flags: Arc<PlaybackFlags>,
}

impl ClientPlaybackEngine {
    pub fn new(consumer: JitterConsumer, flags: Arc<PlaybackFlags>) -> Self {
        Self { consumer, flags }
    }

    /// Fill `out` with the next samples, or silence
    pub fn render(&mut self, out: &mut [f32]) -> Rendered {
        if !self.flags.audible() {
            out.fill(0.0);
            return Rendered::Idle;
        }

        if self.consumer.pop_exact(out) {
            return Rendered::Audio;
        }

        out.fill(0.0);
        let count = self.consumer.record_underrun();
        if count % 100 == 0 {
            debug!(
                "Jitter buffer underrun (total: {}, buffered: {})",
                count,
                self.consumer.available()
            );
        } else {
            trace!("Jitter buffer underrun (total: {})", count);
        }
        Rendered::Underrun
    }

    pub fn flags(&self) -> &Arc<PlaybackFlags> {
        &self.flags
    }

    pub fn stats(&self) -> JitterStats {
        self.consumer.stats()
    }
}
