//! Shared playback clock
//!
//! One record holds the playback state, the sample offset into the current
//! track, the track itself and its generation. Every listener task reads
//! *and advances* the same offset, so the whole audience shares a single
//! cursor.
//!
//! The record sits behind a short `std::sync::Mutex` that is never held
//! across an `.await`. State changes are published on a `watch` channel so
//! paused listener tasks can sleep until playback starts.

use crate::loader::DecodedTrack;
use jamcast_common::PlaybackState;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Contiguous slice `[offset, end)` of the current track
#[derive(Debug, Clone)]
pub struct AudioChunk {
    track: Arc<DecodedTrack>,
    /// First sample of the slice
    pub offset: usize,
    /// One past the last sample of the slice
    pub end: usize,
    /// Generation of the track the slice was cut from
    pub generation: u64,
}

impl AudioChunk {
    pub fn samples(&self) -> &[f32] {
        &self.track.samples()[self.offset..self.end]
    }

    fn len(&self) -> usize {
        self.end - self.offset
    }

    pub fn sample_rate(&self) -> u32 {
        self.track.sample_rate()
    }

    /// Real-time duration of the slice
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate() as f64)
    }
}

/// Result of asking the clock for the next chunk
#[derive(Debug, Clone)]
pub enum ChunkRead {
    /// Samples to send; the shared position already moved past them
    Chunk(AudioChunk),
    /// The current track has no samples left
    EndOfTrack { generation: u64 },
    /// State is not `Playing`
    NotPlaying,
}

/// Point-in-time copy of the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub state: PlaybackState,
    pub position: usize,
    pub total_samples: usize,
    pub sample_rate: u32,
    pub generation: u64,
}

struct ClockInner {
    state: PlaybackState,
    position: usize,
    track: Arc<DecodedTrack>,
    generation: u64,
}

/// The session-wide playback state machine
pub struct PlaybackClock {
    inner: Mutex<ClockInner>,
    state_tx: watch::Sender<PlaybackState>,
}

impl PlaybackClock {
    /// Clock positioned at the start of `track`, initially `Paused`
    pub fn new(track: Arc<DecodedTrack>) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::Paused);
        Self {
            inner: Mutex::new(ClockInner {
                state: PlaybackState::Paused,
                position: 0,
                track,
                generation: 0,
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockInner> {
        // Every critical section leaves the record consistent, so a poisoned
        // lock still holds valid data.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, inner: &mut ClockInner, state: PlaybackState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    /// Restart the current track from the beginning. Always effective.
    pub fn play(&self) -> bool {
        let mut inner = self.lock();
        inner.position = 0;
        self.set_state(&mut inner, PlaybackState::Playing);
        true
    }

    /// Freeze at the current position. Only effective while `Playing`.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Playing {
            return false;
        }
        self.set_state(&mut inner, PlaybackState::Paused);
        true
    }

    /// Continue from the frozen position. Only effective while `Paused`.
    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Paused {
            return false;
        }
        self.set_state(&mut inner, PlaybackState::Playing);
        true
    }

    /// Swap in a newly decoded track, rewind and start playing
    ///
    /// Returns the new generation.
    pub fn load_track(&self, track: Arc<DecodedTrack>) -> u64 {
        let mut inner = self.lock();
        inner.track = track;
        inner.position = 0;
        inner.generation += 1;
        self.set_state(&mut inner, PlaybackState::Playing);
        inner.generation
    }

    /// Cut the next slice of at most `max_samples` and advance the shared position
    pub fn next_chunk(&self, max_samples: usize) -> ChunkRead {
        let mut inner = self.lock();
        if inner.state != PlaybackState::Playing {
            return ChunkRead::NotPlaying;
        }

        let total = inner.track.len();
        let offset = inner.position.min(total);
        let end = (offset + max_samples).min(total);
        if offset == end {
            return ChunkRead::EndOfTrack {
                generation: inner.generation,
            };
        }

        inner.position = end;
        ChunkRead::Chunk(AudioChunk {
            track: Arc::clone(&inner.track),
            offset,
            end,
            generation: inner.generation,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().track.sample_rate()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let inner = self.lock();
        ClockSnapshot {
            state: inner.state,
            position: inner.position,
            total_samples: inner.track.len(),
            sample_rate: inner.track.sample_rate(),
            generation: inner.generation,
        }
    }

    /// Watch playback state changes
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Suspend until the state is `Playing`
    ///
    /// Returns `false` if `shutdown` fired first.
    pub async fn wait_until_playing(&self, shutdown: &CancellationToken) -> bool {
        let mut rx = self.state_tx.subscribe();
        loop {
            if *rx.borrow_and_update() == PlaybackState::Playing {
                return true;
            }
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}
