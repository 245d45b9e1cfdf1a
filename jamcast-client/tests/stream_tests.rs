//! Client pipeline tests against a scripted server on the loopback interface

use futures::{SinkExt, StreamExt};
use jamcast_client::commands::{run_echo_listener, ClientCommandSender};
use jamcast_client::engine::{ClientPlaybackEngine, Rendered};
use jamcast_client::flags::PlaybackFlags;
use jamcast_client::jitter::JitterBuffer;
use jamcast_client::receiver::{ClientReceiver, SessionEnd};
use jamcast_common::command::line_codec;
use jamcast_common::wire::{encode_chunk, frame_codec, write_sample_rate};
use jamcast_common::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, FramedWrite};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 / len as f32).collect()
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Accept one audio listener and send `chunks` after the rate header
async fn audio_server(sample_rate: u32, chunks: Vec<Vec<f32>>) -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        write_sample_rate(&mut socket, sample_rate).await.unwrap();
        let mut frames = FramedWrite::new(socket, frame_codec());
        for chunk in chunks {
            if frames.send(encode_chunk(&chunk).unwrap()).await.is_err() {
                return;
            }
        }
    });
    (endpoint, task)
}

#[tokio::test]
async fn test_stream_reaches_engine_in_order() {
    let signal = ramp(3_000);
    let chunks: Vec<Vec<f32>> = signal.chunks(700).map(|c| c.to_vec()).collect();
    let (endpoint, server) = audio_server(48_000, chunks).await;

    let mut receiver = ClientReceiver::connect(&endpoint).await.unwrap();
    assert_eq!(receiver.handshake().await.unwrap(), 48_000);

    let (mut producer, consumer) = JitterBuffer::new(4_096).split();
    let end = receiver
        .run(&mut producer, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(end, SessionEnd::PeerClosed);
    server.await.unwrap();

    let flags = Arc::new(PlaybackFlags::new());
    flags.apply(Command::Play);
    let mut engine = ClientPlaybackEngine::new(consumer, flags);

    let mut heard = Vec::new();
    let mut buffer = [0.0f32; 500];
    for _ in 0..6 {
        assert_eq!(engine.render(&mut buffer), Rendered::Audio);
        heard.extend_from_slice(&buffer);
    }
    assert_eq!(heard, signal);

    assert_eq!(engine.render(&mut buffer), Rendered::Underrun);
    assert!(buffer.iter().all(|s| *s == 0.0));
    assert_eq!(engine.stats().underruns, 1);
}

#[tokio::test]
async fn test_paused_listener_keeps_buffer() {
    let (endpoint, _server) = audio_server(8_000, vec![vec![0.25; 256]]).await;
    let (mut producer, consumer) = JitterBuffer::new(1_024).split();
    ClientReceiver::connect(&endpoint)
        .await
        .unwrap()
        .run(&mut producer, &CancellationToken::new())
        .await
        .unwrap();

    let flags = Arc::new(PlaybackFlags::new());
    flags.apply(Command::Play);
    flags.apply(Command::Pause);
    let mut engine = ClientPlaybackEngine::new(consumer, Arc::clone(&flags));

    let mut buffer = [1.0f32; 128];
    assert_eq!(engine.render(&mut buffer), Rendered::Idle);
    assert!(buffer.iter().all(|s| *s == 0.0));
    assert_eq!(engine.stats().occupied, 256);

    flags.apply(Command::Resume);
    assert_eq!(engine.render(&mut buffer), Rendered::Audio);
    assert!(buffer.iter().all(|s| *s == 0.25));
}

#[tokio::test]
async fn test_slow_consumer_throttles_receiver() {
    let chunks = vec![vec![0.5; 1_000]; 8];
    let (endpoint, server) = audio_server(8_000, chunks).await;

    let (mut producer, mut consumer) = JitterBuffer::new(1_500).split();
    let shutdown = CancellationToken::new();
    let receiver = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let end = ClientReceiver::connect(&endpoint)
                .await
                .unwrap()
                .run(&mut producer, &shutdown)
                .await
                .unwrap();
            (end, producer.stats())
        })
    };

    assert!(eventually(|| consumer.available() == 1_500).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(consumer.available(), 1_500);

    let mut drained = 0usize;
    let mut buffer = [0.0f32; 500];
    let deadline = tokio::time::Instant::now() + WAIT;
    while drained < 8_000 && tokio::time::Instant::now() < deadline {
        if consumer.pop_exact(&mut buffer) {
            drained += buffer.len();
        } else {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
    assert_eq!(drained, 8_000);

    let (end, stats) = tokio::time::timeout(WAIT, receiver).await.unwrap().unwrap();
    assert_eq!(end, SessionEnd::PeerClosed);
    assert_eq!(stats.samples_pushed, 8_000);
    server.await.unwrap();
}

#[tokio::test]
async fn test_master_and_follower_flags_track_server_echoes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap();

    // Echo every command back, like a server whose only client is master
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = Framed::new(socket, line_codec());
        while let Some(Ok(line)) = lines.next().await {
            if line == "sair" {
                break;
            }
            lines.send(line).await.unwrap();
        }
        lines.send("shutdown".to_string()).await.ok();
    });

    let stream = tokio::net::TcpStream::connect(endpoint).await.unwrap();
    let (read_half, write_half) = stream.into_split();
    let flags = Arc::new(PlaybackFlags::new());
    let follower = Arc::new(PlaybackFlags::new());
    let shutdown = CancellationToken::new();

    let echoes = tokio::spawn(run_echo_listener(read_half, Arc::clone(&follower), shutdown.clone()));
    let mut sender = ClientCommandSender::new(write_half, Arc::clone(&flags));

    sender.send(Command::Play).await.unwrap();
    assert!(flags.audible());
    assert!(eventually(|| follower.audible()).await);

    sender.send(Command::Pause).await.unwrap();
    assert!(eventually(|| follower.is_paused()).await);

    sender.send(Command::Resume).await.unwrap();
    assert!(eventually(|| follower.audible()).await);

    sender.send(Command::Quit).await.unwrap();
    assert!(flags.is_stopped());

    tokio::time::timeout(WAIT, echoes).await.unwrap().unwrap().unwrap();
    assert!(shutdown.is_cancelled());
    assert!(follower.is_stopped());
    server.await.unwrap();
}
