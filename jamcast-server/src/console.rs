//! Operator console
//!
//! `shutdown` tells every control client and stops the server; `status`
//! logs the current playback position.
//!
//! Lines arrive over a channel fed by a plain thread reading standard input,
//! so a blocked terminal read never holds up runtime shutdown.

use crate::authority::AuthorityHandle;
use crate::session::Session;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Forward standard input lines to the returned channel from a detached thread
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
        debug!("Console input closed");
    });
    rx
}

pub async fn run_console(
    mut lines: mpsc::Receiver<String>,
    authority: AuthorityHandle,
    session: Arc<Session>,
    shutdown: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.recv() => match line {
                Some(line) => line,
                None => return,
            },
        };

        match line.trim().to_ascii_lowercase().as_str() {
            "" => {}
            "shutdown" => {
                info!("Shutdown requested from console");
                authority.shutdown().await;
                return;
            }
            "status" => {
                let snap = session.clock().snapshot();
                let track = session.now_playing();
                let control = authority.status().await;
                info!(
                    "{} [{}] {} at {}/{} samples ({} Hz), control: {:?}",
                    snap.state,
                    track.index,
                    track.name,
                    snap.position,
                    snap.total_samples,
                    snap.sample_rate,
                    control
                );
            }
            other => warn!("Unknown console command '{}' (try: status, shutdown)", other),
        }
    }
}
