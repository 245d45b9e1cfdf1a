//! Control channel, client side
//!
//! `ClientCommandSender` writes commands and mirrors them into the local
//! flags right away, so the listener hears its own `pause` without waiting
//! for the round trip. `run_echo_listener` applies what the server
//! broadcasts, which is how non-master clients follow the master.

use crate::error::{Error, Result};
use crate::flags::PlaybackFlags;
use futures::{SinkExt, StreamExt};
use jamcast_common::command::{line_codec, parse_line};
use jamcast_common::Command;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ClientCommandSender<W> {
    sink: FramedWrite<W, LinesCodec>,
    flags: Arc<PlaybackFlags>,
}

impl<W> ClientCommandSender<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, flags: Arc<PlaybackFlags>) -> Self {
        Self {
            sink: FramedWrite::new(writer, line_codec()),
            flags,
        }
    }

    /// Send one command and mirror it locally
    ///
    /// `shutdown` is reserved for the server and is refused.
    pub async fn send(&mut self, command: Command) -> Result<()> {
        if command == Command::Shutdown {
            return Err(Error::Protocol(jamcast_common::Error::UnknownCommand(
                command.to_string(),
            )));
        }

        if command != Command::Quit {
            self.flags.apply(command);
        }
        self.sink.send(command.as_str()).await.map_err(line_error)?;
        if command == Command::Quit {
            self.flags.apply(command);
        }
        debug!("Sent {}", command);
        Ok(())
    }
}

/// Apply server broadcasts to `flags` until the channel closes
///
/// A `shutdown` broadcast stops playback and cancels `shutdown`.
pub async fn run_echo_listener<R>(
    reader: R,
    flags: Arc<PlaybackFlags>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, line_codec());

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next() => line,
        };

        let line = match line {
            Some(line) => line.map_err(line_error)?,
            None => {
                info!("Command channel closed by server");
                return Ok(());
            }
        };

        for parsed in parse_line(&line) {
            match parsed {
                Ok(Command::Shutdown) => {
                    info!("Server is shutting down");
                    flags.apply(Command::Shutdown);
                    shutdown.cancel();
                    return Ok(());
                }
                Ok(command) => {
                    debug!("Server says {}", command);
                    flags.apply(command);
                }
                Err(e) => warn!("Ignoring server line: {}", e),
            }
        }
    }
}

fn line_error(e: tokio_util::codec::LinesCodecError) -> Error {
    match e {
        tokio_util::codec::LinesCodecError::Io(e) => Error::Io(e),
        tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => Error::Protocol(
            jamcast_common::Error::MalformedFrame("command line too long".to_string()),
        ),
    }
}
