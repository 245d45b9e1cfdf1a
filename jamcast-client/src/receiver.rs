//! Audio stream receiver
//!
//! Reads the sample-rate header, then length-prefixed compressed chunks, and
//! queues their samples in the jitter buffer. A full buffer stalls the
//! reader, which is the intended backpressure.

use crate::error::{Error, Result};
use crate::jitter::JitterProducer;
use futures::StreamExt;
use jamcast_common::wire::{decode_chunk, frame_codec, read_sample_rate};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How a receive session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server closed the stream
    PeerClosed,
    /// Local shutdown was requested
    Shutdown,
}

pub struct ClientReceiver<S> {
    stream: S,
    sample_rate: Option<u32>,
}

impl ClientReceiver<TcpStream> {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        info!("Connected to audio stream at {}", endpoint);
        Ok(Self::new(stream))
    }
}

impl<S> ClientReceiver<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            sample_rate: None,
        }
    }

    /// Read the sample-rate header (once)
    pub async fn handshake(&mut self) -> Result<u32> {
        if let Some(rate) = self.sample_rate {
            return Ok(rate);
        }
        let rate = read_sample_rate(&mut self.stream).await?;
        debug!("Stream sample rate: {} Hz", rate);
        self.sample_rate = Some(rate);
        Ok(rate)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Receive chunks into `producer` until the stream ends or `shutdown` fires
    ///
    /// # Errors
    /// - `MalformedFrame` (as `Error::Protocol`) for oversized, truncated or
    ///   undecodable frames
    /// - `Error::Io` for connection faults
    pub async fn run(mut self, producer: &mut JitterProducer, shutdown: &CancellationToken) -> Result<SessionEnd> {
        self.handshake().await?;
        let mut frames = FramedRead::new(self.stream, frame_codec());
        let mut chunks: u64 = 0;

        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                frame = frames.next() => frame,
            };

            let frame = match frame {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(classify(e)),
                None => {
                    info!("Audio stream closed by server after {} chunks", chunks);
                    return Ok(SessionEnd::PeerClosed);
                }
            };

            let samples = decode_chunk(&frame)?;
            chunks += 1;
            trace!("chunk {}: {} samples", chunks, samples.len());

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
                queued = producer.push(&samples) => {
                    if !queued {
                        debug!("Playback engine gone; stopping receiver");
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }
}

/// Run `receiver` to the end and describe how the audio session ended
///
/// A stream closed by the server ends the whole client session: `shutdown`
/// is cancelled. A broken stream leaves the client running on silence.
/// Returns the notice for the user, or `None` after a local shutdown.
pub async fn receive_until_end<S>(
    receiver: ClientReceiver<S>,
    producer: &mut JitterProducer,
    shutdown: &CancellationToken,
) -> Option<String>
where
    S: AsyncRead + Unpin,
{
    match receiver.run(producer, shutdown).await {
        Ok(SessionEnd::Shutdown) => None,
        Ok(SessionEnd::PeerClosed) => {
            shutdown.cancel();
            Some("The server closed the audio stream; leaving the session.".to_string())
        }
        Err(e) => {
            warn!("Audio receiver stopped: {}", e);
            Some(format!(
                "Audio stream lost ({}); playing silence. Type sair to leave.",
                e
            ))
        }
    }
}

/// Framing failures are protocol errors; everything else is a connection fault
fn classify(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::InvalidData | std::io::ErrorKind::Other => {
            Error::Protocol(jamcast_common::Error::MalformedFrame(e.to_string()))
        }
        _ => Error::Io(e),
    }
}
