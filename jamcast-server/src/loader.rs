//! Track decoding
//!
//! `TrackLoader` is the boundary to the external decoder. The server only
//! needs one channel of `f32` samples and a sample rate; multi-channel
//! sources are averaged down to mono.
//!
//! `SymphoniaLoader` is the production implementation (MP3, FLAC, AAC,
//! Vorbis, WAV).

use crate::error::{Error, Result};
use crate::playlist::Track;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded mono track
#[derive(Debug, Clone)]
pub struct DecodedTrack {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedTrack {
    /// # Errors
    /// `Error::Decode` for an empty sample array or a zero sample rate.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Decode("sample rate of 0 Hz".to_string()));
        }
        if samples.is_empty() {
            return Err(Error::Decode("track decoded to zero samples".to_string()));
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Turns a playlist entry into samples
///
/// Called from `spawn_blocking`; implementations may block on file I/O.
pub trait TrackLoader: Send + Sync {
    fn decode(&self, track: &Track) -> Result<DecodedTrack>;
}

/// Decoder backed by symphonia's default probe and codec registry
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaLoader;

impl TrackLoader for SymphoniaLoader {
    fn decode(&self, track: &Track) -> Result<DecodedTrack> {
        debug!("Decoding {}", track.path.display());

        let file = std::fs::File::open(&track.path)
            .map_err(|e| Error::Decode(format!("Failed to open {}: {}", track.path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = track.path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe {}: {}", track.name, e)))?;
        let mut format = probed.format;

        let audio_track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("No audio track in {}", track.name)))?;
        let track_id = audio_track.id;
        let sample_rate = audio_track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode(format!("Sample rate unknown for {}", track.name)))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&audio_track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Stopped reading {}: {}", track.name, e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let channels = spec.channels.count().max(1);
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    downmix_into(buffer.samples(), channels, &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet in {}: {}", track.name, e);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decoding {} failed: {}", track.name, e)));
                }
            }
        }

        debug!(
            "Decoded {}: {} samples at {} Hz",
            track.name,
            samples.len(),
            sample_rate
        );
        DecodedTrack::new(samples, sample_rate)
    }
}

/// Average interleaved frames down to one channel
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn track_at(path: PathBuf) -> Track {
        Track {
            name: path.file_name().unwrap().to_string_lossy().into_owned(),
            path,
            ordinal: 0,
        }
    }

    #[test]
    fn test_decoded_track_validation() {
        assert!(matches!(DecodedTrack::new(vec![0.0], 0), Err(Error::Decode(_))));
        assert!(matches!(DecodedTrack::new(vec![], 44_100), Err(Error::Decode(_))));

        let track = DecodedTrack::new(vec![0.0; 22_050], 44_100).unwrap();
        assert_eq!(track.len(), 22_050);
        assert_eq!(track.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_downmix_averages_channels() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);

        out.clear();
        downmix_into(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.2]);
    }

    #[test]
    fn test_decode_stereo_wav_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..1_000 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = SymphoniaLoader.decode(&track_at(path)).unwrap();
        assert_eq!(decoded.sample_rate(), 8_000);
        assert_eq!(decoded.len(), 1_000);
        assert!(decoded.samples().iter().all(|s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"this is not audio at all").unwrap();

        assert!(matches!(
            SymphoniaLoader.decode(&track_at(path)),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/missing.mp3");
        assert!(matches!(
            SymphoniaLoader.decode(&track_at(path)),
            Err(Error::Decode(_))
        ));
    }
}
