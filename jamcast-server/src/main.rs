//! JamCast server - Main entry point
//!
//! Streams one shared playlist to every connected listener and accepts
//! transport commands from a single elected master.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use jamcast_common::logging::init_tracing;
use jamcast_server::api::{self, AppContext};
use jamcast_server::authority::{run_command_server, CommandAuthority};
use jamcast_server::config::ServerConfig;
use jamcast_server::console::{run_console, spawn_stdin_reader};
use jamcast_server::loader::SymphoniaLoader;
use jamcast_server::playlist::Playlist;
use jamcast_server::streamer::{AudioBroadcastServer, ListenerRegistry};
use jamcast_server::Session;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command-line arguments for jamcast-server
///
/// Every option overrides the matching key of `server.toml`.
#[derive(Parser, Debug)]
#[command(name = "jamcast-server")]
#[command(about = "Synchronized multi-listener audio broadcast server")]
#[command(version)]
struct Args {
    /// Configuration file (default: <config dir>/jamcast/server.toml)
    #[arg(short, long, env = "JAMCAST_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Folder containing the tracks to broadcast
    #[arg(short, long, env = "JAMCAST_MUSIC_FOLDER")]
    music_folder: Option<PathBuf>,

    /// Track file extension
    #[arg(short, long, env = "JAMCAST_EXTENSION")]
    extension: Option<String>,

    /// Address to bind every listener to
    #[arg(long, env = "JAMCAST_BIND")]
    bind: Option<String>,

    /// Audio stream port
    #[arg(long, env = "JAMCAST_AUDIO_PORT")]
    audio_port: Option<u16>,

    /// Command channel port
    #[arg(long, env = "JAMCAST_COMMAND_PORT")]
    command_port: Option<u16>,

    /// HTTP status port (0 disables)
    #[arg(long, env = "JAMCAST_STATUS_PORT")]
    status_port: Option<u16>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "JAMCAST_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn apply_to(self, config: &mut ServerConfig) {
        if let Some(folder) = self.music_folder {
            config.music_folder = folder;
        }
        if let Some(extension) = self.extension {
            config.extension = extension;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(port) = self.audio_port {
            config.audio_port = port;
        }
        if let Some(port) = self.command_port {
            config.command_port = port;
        }
        if let Some(port) = self.status_port {
            config.status_port = port;
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
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config);

    init_tracing(&["jamcast_server", "jamcast_common"], &config.logging.level);
    config.validate().context("Invalid configuration")?;

    info!("Starting JamCast server v{}", env!("CARGO_PKG_VERSION"));
    info!("Music folder: {}", config.music_folder.display());

    let playlist = Playlist::load(&config.music_folder, &config.extension).with_context(|| {
        format!("Failed to load playlist from {}", config.music_folder.display())
    })?;
    let session = Session::start(playlist, Arc::new(SymphoniaLoader))
        .await
        .context("Failed to start broadcast session")?;

    let audio_addr = config.audio_addr()?;
    let audio_listener = TcpListener::bind(audio_addr)
        .await
        .with_context(|| format!("Failed to bind audio port {}", audio_addr))?;
    let command_addr = config.command_addr()?;
    let command_listener = TcpListener::bind(command_addr)
        .await
        .with_context(|| format!("Failed to bind command port {}", command_addr))?;
    let status_listener = match config.status_addr()? {
        Some(addr) => Some(
            TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind status port {}", addr))?,
        ),
        None => None,
    };

    let shutdown = CancellationToken::new();
    let listeners = Arc::new(ListenerRegistry::new());
    let (authority, authority_task) = CommandAuthority::spawn(Arc::clone(&session), shutdown.clone());

    let streamer = AudioBroadcastServer::new(
        Arc::clone(&session),
        Arc::clone(&listeners),
        config.chunk_samples,
    );
    let audio_task = tokio::spawn(streamer.run(audio_listener, shutdown.clone()));
    let command_task = tokio::spawn(run_command_server(
        command_listener,
        authority.clone(),
        shutdown.clone(),
    ));
    let status_task = status_listener.map(|listener| {
        let ctx = AppContext {
            session: Arc::clone(&session),
            authority: authority.clone(),
            listeners: Arc::clone(&listeners),
            started_at: Utc::now(),
        };
        tokio::spawn(api::run(listener, ctx, shutdown.clone()))
    });
    tokio::spawn(run_console(
        spawn_stdin_reader(),
        authority.clone(),
        Arc::clone(&session),
        shutdown.clone(),
    ));

    info!("Server ready; type 'shutdown' to stop");

    tokio::select! {
        _ = shutdown_signal() => {
            authority.shutdown().await;
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
    info!("Shutting down");

    join_service("audio stream", audio_task).await;
    join_service("command channel", command_task).await;
    if let Some(task) = status_task {
        join_service("status API", task).await;
    }
    if let Err(e) = authority_task.await {
        warn!("Command authority task failed: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn join_service(name: &str, task: JoinHandle<jamcast_server::Result<()>>) {
    match task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{} failed: {}", name, e),
        Err(e) => error!("{} task panicked: {}", name, e),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
