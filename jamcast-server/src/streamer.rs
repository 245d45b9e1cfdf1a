//! Audio port: one streaming task per listener
//!
//! A listener receives the sample rate once, then length-prefixed compressed
//! chunks cut from the shared clock, paced at real-time rate. Every task
//! advances the same cursor, so listeners never hear the same samples twice.

use crate::clock::ChunkRead;
use crate::error::Result;
use crate::pacing::Pacer;
use crate::session::Session;
use futures::SinkExt;
use jamcast_common::wire::{encode_chunk, frame_codec, write_sample_rate};
use jamcast_common::PlaybackState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Open audio connections, keyed by a per-process id
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, SocketAddr>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, addr: SocketAddr) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, addr);
        id
    }

    pub fn deregister(&self, id: u64) -> Option<SocketAddr> {
        self.lock().remove(&id)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SocketAddr>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct AudioBroadcastServer {
    session: Arc<Session>,
    registry: Arc<ListenerRegistry>,
    chunk_samples: usize,
}

impl AudioBroadcastServer {
    pub fn new(session: Arc<Session>, registry: Arc<ListenerRegistry>, chunk_samples: usize) -> Self {
        Self {
            session,
            registry,
            chunk_samples: chunk_samples.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Accept listeners until `shutdown` fires
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!("Audio stream listening on {}", listener.local_addr()?);
        let server = Arc::new(self);

        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Audio accept failed: {}", e);
                        continue;
                    }
                },
            };

            let id = server.registry.register(addr);
            info!(
                "Listener {} connected from {} ({} listening)",
                id,
                addr,
                server.registry.count()
            );

            let server = Arc::clone(&server);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match server.stream_to(stream, &shutdown).await {
                    Ok(()) => debug!("Listener {} closed for shutdown", id),
                    Err(e) => info!("Listener {} ({}) dropped: {}", id, addr, e),
                }
                server.registry.deregister(id);
                info!("Listener {} disconnected ({} listening)", id, server.registry.count());
            });
        }

        info!("Audio stream stopped accepting");
        Ok(())
    }

    /// Stream to one listener; `Ok` means the shutdown token fired
    async fn stream_to(&self, mut stream: TcpStream, shutdown: &CancellationToken) -> Result<()> {
        stream.set_nodelay(true)?;
        let clock = self.session.clock();
        write_sample_rate(&mut stream, clock.sample_rate()).await?;

        let mut frames = FramedWrite::new(stream, frame_codec());
        let mut pacer = Pacer::new();

        loop {
            if clock.state() != PlaybackState::Playing {
                pacer.reset();
                if !clock.wait_until_playing(shutdown).await {
                    return Ok(());
                }
            }

            let chunk = match clock.next_chunk(self.chunk_samples) {
                ChunkRead::Chunk(chunk) => chunk,
                ChunkRead::NotPlaying => {
                    pacer.reset();
                    continue;
                }
                ChunkRead::EndOfTrack { generation } => {
                    if let Err(e) = self.session.end_of_track(generation).await {
                        warn!("Could not advance past generation {}: {}", generation, e);
                    }
                    pacer.reset();
                    continue;
                }
            };

            let payload = encode_chunk(chunk.samples())?;
            trace!(
                "chunk [{}, {}) gen {} -> {} bytes",
                chunk.offset,
                chunk.end,
                chunk.generation,
                payload.len()
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                sent = frames.send(payload) => sent?,
            }

            let due = pacer.schedule(tokio::time::Instant::now(), chunk.duration());
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep_until(due) => {}
            }
        }
    }
}
