//! JamCast client - Main entry point
//!
//! Plays the broadcast and reads transport commands from the terminal.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jamcast_client::commands::{run_echo_listener, ClientCommandSender};
use jamcast_client::config::{ClientConfig, OutputKind};
use jamcast_client::engine::ClientPlaybackEngine;
use jamcast_client::flags::PlaybackFlags;
use jamcast_client::jitter::JitterBuffer;
use jamcast_client::output::open_output;
use jamcast_client::receiver::{receive_until_end, ClientReceiver};
use jamcast_common::command::parse_line;
use jamcast_common::logging::init_tracing;
use jamcast_common::Command;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PROMPT: &str = "Command (play, pause, resume, next, sair): ";

/// Command-line arguments for jamcast-client
///
/// Every option overrides the matching key of `client.toml`.
#[derive(Parser, Debug)]
#[command(name = "jamcast-client")]
#[command(about = "Listen to a JamCast broadcast and control playback")]
#[command(version)]
struct Args {
    /// Configuration file (default: <config dir>/jamcast/client.toml)
    #[arg(short, long, env = "JAMCAST_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host name or address
    #[arg(short, long, env = "JAMCAST_SERVER")]
    server: Option<String>,

    /// Audio stream port
    #[arg(long, env = "JAMCAST_AUDIO_PORT")]
    audio_port: Option<u16>,

    /// Command channel port
    #[arg(long, env = "JAMCAST_COMMAND_PORT")]
    command_port: Option<u16>,

    /// Jitter buffer size in samples
    #[arg(long, env = "JAMCAST_JITTER_CAPACITY")]
    jitter_capacity: Option<usize>,

    /// Samples rendered per output buffer
    #[arg(long, env = "JAMCAST_OUTPUT_FRAMES")]
    output_frames: Option<usize>,

    /// Output device
    #[arg(short, long, value_enum, env = "JAMCAST_OUTPUT")]
    output: Option<OutputKind>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "JAMCAST_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply_to(self, config: &mut ClientConfig) {
        if let Some(server) = self.server {
            config.server_host = server;
        }
        if let Some(port) = self.audio_port {
            config.audio_port = port;
        }
        if let Some(port) = self.command_port {
            config.command_port = port;
        }
        if let Some(capacity) = self.jitter_capacity {
            config.jitter_capacity = capacity;
        }
        if let Some(frames) = self.output_frames {
            config.output_frames = frames;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config =
        ClientConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config);

    init_tracing(&["jamcast_client", "jamcast_common"], &config.logging.level);
    config.validate().context("Invalid configuration")?;

    info!("Starting JamCast client v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    let flags = Arc::new(PlaybackFlags::new());

    // Audio path: socket -> jitter buffer -> output device
    let mut receiver = ClientReceiver::connect(&config.audio_endpoint())
        .await
        .with_context(|| format!("Failed to connect to audio stream at {}", config.audio_endpoint()))?;
    let sample_rate = receiver.handshake().await.context("Audio stream handshake failed")?;

    let (mut producer, consumer) = JitterBuffer::new(config.jitter_capacity).split();
    let engine = ClientPlaybackEngine::new(consumer, Arc::clone(&flags));
    let mut output = open_output(
        config.output,
        engine,
        sample_rate,
        config.output_frames,
        &shutdown,
    )
    .context("Failed to open audio output")?;
    info!("Audio output: {}", output.describe());

    let receive_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Some(notice) = receive_until_end(receiver, &mut producer, &shutdown).await {
                println!("\n{}", notice);
                if !shutdown.is_cancelled() {
                    prompt();
                }
            }
            producer.stats()
        })
    };

    // Control path: terminal -> server, server echoes -> local flags
    let command_stream = TcpStream::connect(config.command_endpoint())
        .await
        .with_context(|| format!("Failed to connect to command channel at {}", config.command_endpoint()))?;
    let (read_half, write_half) = command_stream.into_split();
    tokio::spawn(run_echo_listener(read_half, Arc::clone(&flags), shutdown.clone()));
    let mut sender = ClientCommandSender::new(write_half, Arc::clone(&flags));

    let mut input = spawn_stdin_reader();
    prompt();

    'prompt: loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = input.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        for parsed in parse_line(&line) {
            match parsed {
                Ok(Command::Shutdown) => println!("Only the server operator can shut down"),
                Ok(command) => {
                    if let Err(e) = sender.send(command).await {
                        warn!("Failed to send {}: {}", command, e);
                        break 'prompt;
                    }
                    if command == Command::Quit {
                        break 'prompt;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
        prompt();
    }

    info!("Leaving session");
    shutdown.cancel();
    output.stop();
    let output_stats = output.stats();

    match receive_task.await {
        Ok(stats) => info!(
            "Received {} samples; {} underruns; output rendered {} buffers of audio",
            stats.samples_pushed, stats.underruns, output_stats.audio
        ),
        Err(e) => warn!("Receiver task failed: {}", e),
    }
    Ok(())
}

fn prompt() {
    print!("{}", PROMPT);
    let _ = std::io::stdout().flush();
}

/// Forward terminal lines from a detached thread so a pending read never
/// blocks runtime shutdown
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
