//! Audio wire format
//!
//! The audio port carries, in order:
//! 1. a 4-byte unsigned sample rate (Hz), sent once per connection;
//! 2. any number of frames: 4-byte unsigned length N, then N bytes of a
//!    zlib-compressed chunk payload.
//!
//! Chunk payload (before compression): `u32` sample count followed by that
//! many `f32` samples. Every integer and float on the wire is little-endian.
//! The payload carries no type information, only the sample count and the
//! raw sample values.

use crate::error::{Error, Result};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::LengthDelimitedCodec;

/// Default number of samples per broadcast chunk
pub const CHUNK_SAMPLES: usize = 2048;

/// Largest chunk (in samples) a receiver accepts
pub const MAX_CHUNK_SAMPLES: usize = 65_536;

/// Largest compressed frame (in bytes) a receiver accepts
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Size of the length prefix and of the sample-rate header
pub const HEADER_LEN: usize = 4;

/// Codec for length-prefixed audio frames
///
/// 4-byte little-endian length, payload bytes follow. Short reads are
/// accumulated by the codec until the whole frame is available.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(HEADER_LEN)
        .little_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Serialize and compress one chunk of samples
pub fn encode_chunk(samples: &[f32]) -> Result<Bytes> {
    if samples.len() > MAX_CHUNK_SAMPLES {
        return Err(Error::MalformedFrame(format!(
            "chunk of {} samples exceeds limit of {}",
            samples.len(),
            MAX_CHUNK_SAMPLES
        )));
    }

    let mut raw = Vec::with_capacity(HEADER_LEN + samples.len() * 4);
    raw.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    for sample in samples {
        raw.extend_from_slice(&sample.to_le_bytes());
    }

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::fast());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    Ok(Bytes::from(compressed))
}

/// Decompress and deserialize one chunk of samples
///
/// Rejects payloads whose declared sample count does not match the number of
/// bytes that follow, and payloads that inflate beyond the chunk limit.
pub fn decode_chunk(frame: &[u8]) -> Result<Vec<f32>> {
    let limit = (HEADER_LEN + MAX_CHUNK_SAMPLES * 4) as u64;
    let mut raw = Vec::new();
    ZlibDecoder::new(frame)
        .take(limit + 1)
        .read_to_end(&mut raw)
        .map_err(|e| Error::MalformedFrame(format!("decompression failed: {}", e)))?;

    if raw.len() as u64 > limit {
        return Err(Error::MalformedFrame("decompressed chunk too large".to_string()));
    }
    if raw.len() < HEADER_LEN {
        return Err(Error::MalformedFrame(format!(
            "payload of {} bytes is shorter than its header",
            raw.len()
        )));
    }

    let (header, body) = raw.split_at(HEADER_LEN);
    let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if count * 4 != body.len() {
        return Err(Error::MalformedFrame(format!(
            "declared {} samples but payload holds {} bytes",
            count,
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Send the per-connection sample-rate header
pub async fn write_sample_rate<W: AsyncWrite + Unpin>(writer: &mut W, sample_rate: u32) -> Result<()> {
    writer.write_u32_le(sample_rate).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the per-connection sample-rate header
pub async fn read_sample_rate<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u32> {
    let sample_rate = reader.read_u32_le().await?;
    if sample_rate == 0 {
        return Err(Error::MalformedFrame("sample rate of 0 Hz".to_string()));
    }
    Ok(sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_chunk_round_trip_is_lossless() {
        let samples: Vec<f32> = (0..CHUNK_SAMPLES)
            .map(|i| ((i as f32) * 0.013).sin() * 0.9)
            .collect();

        let encoded = encode_chunk(&samples).unwrap();
        let decoded = decode_chunk(&encoded).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_round_trip_preserves_special_values() {
        let samples = vec![0.0, -0.0, 1.0, -1.0, f32::MIN_POSITIVE, f32::MAX, f32::MIN, 1e-30];
        let decoded = decode_chunk(&encode_chunk(&samples).unwrap()).unwrap();
        let bits: Vec<u32> = decoded.iter().map(|s| s.to_bits()).collect();
        let expected: Vec<u32> = samples.iter().map(|s| s.to_bits()).collect();
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_empty_chunk() {
        let decoded = decode_chunk(&encode_chunk(&[]).unwrap()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = decode_chunk(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_count_mismatch_is_malformed() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&10u32.to_le_bytes());
        raw.extend_from_slice(&1.0f32.to_le_bytes());
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&raw).unwrap();
        let frame = encoder.finish().unwrap();

        assert!(matches!(decode_chunk(&frame), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let samples = vec![0.0f32; MAX_CHUNK_SAMPLES + 1];
        assert!(matches!(encode_chunk(&samples), Err(Error::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_sample_rate_header_is_little_endian() {
        let mut buf = Vec::new();
        write_sample_rate(&mut buf, 44_100).await.unwrap();
        assert_eq!(buf, 44_100u32.to_le_bytes());

        let mut reader = &buf[..];
        assert_eq!(read_sample_rate(&mut reader).await.unwrap(), 44_100);
    }

    #[tokio::test]
    async fn test_zero_sample_rate_rejected() {
        let buf = 0u32.to_le_bytes();
        let mut reader = &buf[..];
        assert!(matches!(
            read_sample_rate(&mut reader).await,
            Err(Error::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_survive_split_reads() {
        let (client, server) = tokio::io::duplex(7);

        let writer = tokio::spawn(async move {
            let mut sink = FramedWrite::new(server, frame_codec());
            for n in [1usize, 300, CHUNK_SAMPLES] {
                let samples = vec![0.25f32; n];
                sink.send(encode_chunk(&samples).unwrap()).await.unwrap();
            }
        });

        let mut frames = FramedRead::new(client, frame_codec());
        let mut lengths = Vec::new();
        while let Some(frame) = frames.next().await {
            lengths.push(decode_chunk(&frame.unwrap()).unwrap().len());
        }
        writer.await.unwrap();

        assert_eq!(lengths, vec![1, 300, CHUNK_SAMPLES]);
    }

    #[tokio::test]
    async fn test_length_prefix_layout() {
        let mut sink = FramedWrite::new(Vec::new(), frame_codec());
        let payload = encode_chunk(&[0.5, 0.5]).unwrap();
        sink.send(payload.clone()).await.unwrap();

        let written = sink.into_inner();
        assert_eq!(&written[..4], &(payload.len() as u32).to_le_bytes());
        assert_eq!(&written[4..], &payload[..]);
    }
}
