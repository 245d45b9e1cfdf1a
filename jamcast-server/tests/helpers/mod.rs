//! Shared fixtures for server integration tests
//!
//! `MemoryLoader` stands in for the decoder: tracks are sample vectors keyed
//! by file name, and any name containing "broken" fails to decode.

#![allow(dead_code)]

use futures::StreamExt;
use jamcast_common::command::line_codec;
use jamcast_common::wire::{decode_chunk, frame_codec, read_sample_rate, CHUNK_SAMPLES};
use jamcast_server::authority::{run_command_server, AuthorityHandle, AuthorityStatus, CommandAuthority};
use jamcast_server::error::{Error, Result};
use jamcast_server::loader::{DecodedTrack, TrackLoader};
use jamcast_server::playlist::{Playlist, Track};
use jamcast_server::streamer::{AudioBroadcastServer, ListenerRegistry};
use jamcast_server::Session;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LengthDelimitedCodec, LinesCodec};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

/// 2048-sample chunks last 10 ms at this rate
pub const FAST_RATE: u32 = 204_800;

pub struct MemoryLoader {
    tracks: HashMap<String, Vec<f32>>,
    sample_rate: u32,
    fail_all: AtomicBool,
    decodes: AtomicUsize,
}

impl MemoryLoader {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            tracks: HashMap::new(),
            sample_rate,
            fail_all: AtomicBool::new(false),
            decodes: AtomicUsize::new(0),
        }
    }

    pub fn with_track(mut self, name: &str, samples: Vec<f32>) -> Self {
        self.tracks.insert(name.to_string(), samples);
        self
    }

    /// Make every later decode fail
    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl TrackLoader for MemoryLoader {
    fn decode(&self, track: &Track) -> Result<DecodedTrack> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) || track.name.contains("broken") {
            return Err(Error::Decode(format!("{} is corrupt", track.name)));
        }
        let samples = self
            .tracks
            .get(&track.name)
            .cloned()
            .ok_or_else(|| Error::Decode(format!("{} not in memory library", track.name)))?;
        DecodedTrack::new(samples, self.sample_rate)
    }
}

/// `len` samples whose values equal `base` plus their offset
pub fn ramp(len: usize, base: f32) -> Vec<f32> {
    (0..len).map(|i| base + i as f32).collect()
}

pub fn playlist(names: &[&str]) -> Playlist {
    Playlist::from_paths(names.iter().map(|name| PathBuf::from("/music").join(name)).collect())
        .unwrap()
}

pub async fn start_session(names: &[&str], loader: &Arc<MemoryLoader>) -> Arc<Session> {
    let loader: Arc<dyn TrackLoader> = loader.clone();
    Session::start(playlist(names), loader).await.unwrap()
}

/// Poll `check` until it holds
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Audio and command ports on loopback, backed by `session`
pub struct TestServer {
    pub session: Arc<Session>,
    pub authority: AuthorityHandle,
    pub listeners: Arc<ListenerRegistry>,
    pub audio_addr: SocketAddr,
    pub command_addr: SocketAddr,
    pub shutdown: CancellationToken,
}

impl TestServer {
    pub async fn start(session: Arc<Session>) -> Self {
        let shutdown = CancellationToken::new();
        let audio = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let command = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let audio_addr = audio.local_addr().unwrap();
        let command_addr = command.local_addr().unwrap();

        let listeners = Arc::new(ListenerRegistry::new());
        let (authority, _task) = CommandAuthority::spawn(Arc::clone(&session), shutdown.clone());

        let streamer = AudioBroadcastServer::new(Arc::clone(&session), Arc::clone(&listeners), CHUNK_SAMPLES);
        tokio::spawn(streamer.run(audio, shutdown.clone()));
        tokio::spawn(run_command_server(command, authority.clone(), shutdown.clone()));

        Self {
            session,
            authority,
            listeners,
            audio_addr,
            command_addr,
            shutdown,
        }
    }

    pub async fn control_status(&self) -> AuthorityStatus {
        self.authority.status().await.unwrap()
    }

    /// Wait until the authority has registered `clients` control connections
    pub async fn wait_for_clients(&self, clients: usize) -> AuthorityStatus {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let status = self.control_status().await;
            if status.clients == clients {
                return status;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("expected {} control clients, have {:?}", clients, status);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Listener end of the audio port
pub struct AudioTap {
    pub sample_rate: u32,
    frames: FramedRead<TcpStream, LengthDelimitedCodec>,
}

impl AudioTap {
    pub async fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let sample_rate = read_sample_rate(&mut stream).await.unwrap();
        Self {
            sample_rate,
            frames: FramedRead::new(stream, frame_codec()),
        }
    }

    pub async fn next_chunk(&mut self) -> Vec<f32> {
        let frame = tokio::time::timeout(WAIT, self.frames.next())
            .await
            .expect("timed out waiting for audio")
            .expect("audio stream closed")
            .expect("audio stream fault");
        decode_chunk(&frame).unwrap()
    }
}

/// Client end of the command port
pub struct ControlClient {
    echoes: FramedRead<OwnedReadHalf, LinesCodec>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (read_half, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            echoes: FramedRead::new(read_half, line_codec()),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
    }

    pub async fn next_echo(&mut self) -> String {
        tokio::time::timeout(WAIT, self.echoes.next())
            .await
            .expect("timed out waiting for echo")
            .expect("control channel closed")
            .expect("control channel fault")
    }
}
