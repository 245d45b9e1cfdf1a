//! Broadcast session: playlist + playback clock
//!
//! All transitions go through here. `play`, `pause` and `resume` only touch
//! the clock; `next` and end-of-track also walk the playlist and decode,
//! which is serialized by the playlist lock. A new track is decoded *before*
//! the playlist index is committed or the clock swapped, so a broken file
//! leaves the current track streaming.

use crate::clock::PlaybackClock;
use crate::error::{Error, Result};
use crate::loader::{DecodedTrack, TrackLoader};
use crate::playlist::Playlist;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Track changes announced to the command authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new track is loaded and playing
    TrackChanged {
        index: usize,
        name: String,
        generation: u64,
    },
    /// End of track reached but no track could be loaded; the clock is paused
    Halted { reason: String },
}

/// Track currently loaded in the clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NowPlaying {
    pub index: usize,
    pub name: String,
}

pub struct Session {
    clock: PlaybackClock,
    playlist: tokio::sync::Mutex<Playlist>,
    playlist_len: usize,
    loader: Arc<dyn TrackLoader>,
    now_playing: Mutex<NowPlaying>,
    /// Generation whose end already failed to advance
    halted: Mutex<Option<u64>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Load the first decodable track and park the clock on it, `Paused` at 0
    ///
    /// # Errors
    /// `Error::Decode` if no track in the playlist can be decoded.
    pub async fn start(playlist: Playlist, loader: Arc<dyn TrackLoader>) -> Result<Arc<Self>> {
        let mut playlist = playlist;
        let (index, track) = decode_first_playable(&loader, &playlist, playlist.index()).await?;
        playlist.set_current(index);

        let now_playing = NowPlaying {
            index,
            name: playlist.current().name.clone(),
        };
        info!(
            "Session ready on {} ({} Hz, {:.1}s), paused",
            now_playing.name,
            track.sample_rate(),
            track.duration().as_secs_f64()
        );

        let (events, _) = broadcast::channel(16);
        Ok(Arc::new(Self {
            clock: PlaybackClock::new(Arc::new(track)),
            playlist_len: playlist.len(),
            playlist: tokio::sync::Mutex::new(playlist),
            loader,
            now_playing: Mutex::new(now_playing),
            halted: Mutex::new(None),
            events,
        }))
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn playlist_len(&self) -> usize {
        self.playlist_len
    }

    pub fn now_playing(&self) -> NowPlaying {
        self.now_playing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn play(&self) -> bool {
        // A replayed track gets a fresh attempt at advancing when it ends
        *self.halted_generation() = None;
        let effective = self.clock.play();
        debug!("play: restarted {}", self.now_playing().name);
        effective
    }

    pub fn pause(&self) -> bool {
        let effective = self.clock.pause();
        debug!("pause: effective={}", effective);
        effective
    }

    pub fn resume(&self) -> bool {
        let effective = self.clock.resume();
        debug!("resume: effective={}", effective);
        effective
    }

    /// Skip to the next decodable track and start playing it
    ///
    /// # Errors
    /// `Error::Decode` if no track could be loaded; the clock is untouched.
    pub async fn next(&self) -> Result<bool> {
        let mut playlist = self.playlist.lock().await;
        self.advance(&mut playlist).await?;
        Ok(true)
    }

    /// Advance after the track of `generation` ran out of samples
    ///
    /// Several listeners may report the same end of track; only the first
    /// report for a generation advances, the rest return `Ok(false)`. If
    /// nothing can be loaded the clock is paused and `Halted` is announced.
    /// Later reports for a halted generation do not decode again; they only
    /// pause the clock if someone resumed it.
    pub async fn end_of_track(&self, generation: u64) -> Result<bool> {
        let mut playlist = self.playlist.lock().await;
        if self.clock.generation() != generation {
            debug!("end of track {} already handled", generation);
            return Ok(false);
        }

        if *self.halted_generation() == Some(generation) {
            if self.clock.pause() {
                debug!("generation {} is still halted; paused again", generation);
                self.announce_halt("no playable track after the current one".to_string());
            }
            return Ok(false);
        }

        match self.advance(&mut playlist).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("Playback halted: {}", e);
                self.clock.pause();
                *self.halted_generation() = Some(generation);
                self.announce_halt(e.to_string());
                Err(e)
            }
        }
    }

    fn announce_halt(&self, reason: String) {
        let _ = self.events.send(SessionEvent::Halted { reason });
    }

    fn halted_generation(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        self.halted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn advance(&self, playlist: &mut Playlist) -> Result<()> {
        let start = playlist.peek_next();
        let (index, track) = decode_first_playable(&self.loader, playlist, start).await?;

        // One step per entry tried, broken ones included
        let steps = (index + playlist.len() - start) % playlist.len() + 1;
        for _ in 0..steps {
            playlist.advance();
        }
        let name = playlist.current().name.clone();

        let generation = self.clock.load_track(Arc::new(track));
        *self
            .now_playing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = NowPlaying {
            index,
            name: name.clone(),
        };

        info!("Now playing [{}] {} (generation {})", index, name, generation);
        let _ = self.events.send(SessionEvent::TrackChanged {
            index,
            name,
            generation,
        });
        Ok(())
    }
}

/// Decode tracks starting at `start`, trying each playlist entry at most once
async fn decode_first_playable(
    loader: &Arc<dyn TrackLoader>,
    playlist: &Playlist,
    start: usize,
) -> Result<(usize, DecodedTrack)> {
    let mut last_error = None;

    for attempt in 0..playlist.len() {
        let index = (start + attempt) % playlist.len();
        let track = playlist.track(index).clone();
        let loader = Arc::clone(loader);
        let name = track.name.clone();

        let decoded = tokio::task::spawn_blocking(move || loader.decode(&track))
            .await
            .map_err(|e| Error::Decode(format!("decoder task failed: {}", e)))
            .and_then(|result| result);

        match decoded {
            Ok(track) => return Ok((index, track)),
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                last_error = Some(e);
            }
        }
    }

    Err(Error::Decode(match last_error {
        Some(e) => format!("no track could be decoded (last error: {})", e),
        None => "playlist is empty".to_string(),
    }))
}
