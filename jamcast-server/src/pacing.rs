//! Real-time pacing for a listener stream
//!
//! Each chunk is due one chunk-duration after the previous one, measured
//! from the previous *due* instant rather than from when the send finished,
//! so encode and write time do not accumulate as drift. A stream that falls
//! more than one chunk behind is re-anchored at the current instant instead
//! of bursting to catch up.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct Pacer {
    next_due: Option<Instant>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the schedule; the next chunk is anchored at the time it is sent
    pub fn reset(&mut self) {
        self.next_due = None;
    }

    /// Record a chunk of `duration` sent at `now`; returns when the next one is due
    pub fn schedule(&mut self, now: Instant, duration: Duration) -> Instant {
        let anchor = match self.next_due {
            Some(due) if now.saturating_duration_since(due) <= duration => due,
            _ => now,
        };
        let due = anchor + duration;
        self.next_due = Some(due);
        due
    }
}
