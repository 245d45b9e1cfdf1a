//! Output devices that drive the playback engine
//!
//! The device owns the clock: it calls `ClientPlaybackEngine::render` once
//! per buffer period and does something with the samples.
//! - `HeadlessOutput`: tokio interval, audio discarded (servers without a
//!   sound card, tests)
//! - `CpalOutput` (feature `cpal`): default sound card, the mono signal copied
//!   to every device channel

use crate::config::OutputKind;
use crate::engine::{ClientPlaybackEngine, Rendered};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A running output; dropping it or calling `stop` halts rendering
pub trait OutputDevice {
    fn describe(&self) -> String;

    /// Render counters so far
    fn stats(&self) -> OutputStats;

    fn stop(&mut self);
}

/// Render calls by outcome
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutputStats {
    pub audio: u64,
    pub idle: u64,
    pub underruns: u64,
}

#[derive(Debug, Default)]
struct RenderCounters {
    audio: AtomicU64,
    idle: AtomicU64,
    underruns: AtomicU64,
}

impl RenderCounters {
    fn record(&self, rendered: Rendered) {
        let counter = match rendered {
            Rendered::Audio => &self.audio,
            Rendered::Idle => &self.idle,
            Rendered::Underrun => &self.underruns,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OutputStats {
        OutputStats {
            audio: self.audio.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

/// Open the configured output and start rendering
pub fn open_output(
    kind: OutputKind,
    engine: ClientPlaybackEngine,
    sample_rate: u32,
    frames: usize,
    shutdown: &CancellationToken,
) -> Result<Box<dyn OutputDevice>> {
    match kind {
        OutputKind::Headless => Ok(Box::new(HeadlessOutput::start(
            engine,
            sample_rate,
            frames,
            shutdown.child_token(),
        )?)),
        #[cfg(feature = "cpal")]
        OutputKind::Cpal => Ok(Box::new(cpal_output::CpalOutput::start(engine, sample_rate)?)),
        #[cfg(not(feature = "cpal"))]
        OutputKind::Cpal => Err(Error::Output(
            "this build has no sound card support (enable the `cpal` feature)".to_string(),
        )),
    }
}

/// Clock-driven sink that renders on a tokio interval and discards the audio
pub struct HeadlessOutput {
    task: Option<JoinHandle<()>>,
    stop: CancellationToken,
    counters: Arc<RenderCounters>,
    period: Duration,
}

impl HeadlessOutput {
    pub fn start(
        mut engine: ClientPlaybackEngine,
        sample_rate: u32,
        frames: usize,
        stop: CancellationToken,
    ) -> Result<Self> {
        if sample_rate == 0 || frames == 0 {
            return Err(Error::Output(format!(
                "invalid headless output: {} frames at {} Hz",
                frames, sample_rate
            )));
        }

        let period = Duration::from_secs_f64(frames as f64 / sample_rate as f64);
        let counters = Arc::new(RenderCounters::default());
        let task = {
            let counters = Arc::clone(&counters);
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut buffer = vec![0.0f32; frames];
                let mut ticks = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticks.tick() => counters.record(engine.render(&mut buffer)),
                    }
                }
            })
        };

        info!(
            "Headless output: {} frames every {:.1} ms",
            frames,
            period.as_secs_f64() * 1000.0
        );
        Ok(Self {
            task: Some(task),
            stop,
            counters,
            period,
        })
    }
}

impl OutputDevice for HeadlessOutput {
    fn describe(&self) -> String {
        format!("headless ({:?} per buffer)", self.period)
    }

    fn stats(&self) -> OutputStats {
        self.counters.snapshot()
    }

    fn stop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HeadlessOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "cpal")]
mod cpal_output {
    use super::{OutputDevice, OutputStats, RenderCounters};
    use crate::engine::ClientPlaybackEngine;
    use crate::error::{Error, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
    use std::sync::Arc;
    use tracing::{error, info, warn};

    /// Default sound card output
    pub struct CpalOutput {
        stream: Option<Stream>,
        device_name: String,
        config: StreamConfig,
        counters: Arc<RenderCounters>,
    }

    impl CpalOutput {
        pub fn start(engine: ClientPlaybackEngine, sample_rate: u32) -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| Error::Output("No default output device found".to_string()))?;
            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

            let (config, sample_format) = best_config(&device, sample_rate)?;
            info!(
                "Using audio device {}: {} Hz, {} channels, {:?}",
                device_name, config.sample_rate.0, config.channels, sample_format
            );
            if config.sample_rate.0 != sample_rate {
                warn!(
                    "Device runs at {} Hz but the stream is {} Hz; playback speed will be off",
                    config.sample_rate.0, sample_rate
                );
            }

            let counters = Arc::new(RenderCounters::default());
            let stream = match sample_format {
                SampleFormat::F32 => build_stream::<f32>(&device, &config, engine, Arc::clone(&counters))?,
                SampleFormat::I16 => build_stream::<i16>(&device, &config, engine, Arc::clone(&counters))?,
                SampleFormat::U16 => build_stream::<u16>(&device, &config, engine, Arc::clone(&counters))?,
                other => {
                    return Err(Error::Output(format!("Unsupported sample format: {:?}", other)));
                }
            };
            stream
                .play()
                .map_err(|e| Error::Output(format!("Failed to start stream: {}", e)))?;

            Ok(Self {
                stream: Some(stream),
                device_name,
                config,
                counters,
            })
        }
    }

    impl OutputDevice for CpalOutput {
        fn describe(&self) -> String {
            format!(
                "{} ({} Hz, {} channels)",
                self.device_name, self.config.sample_rate.0, self.config.channels
            )
        }

        fn stats(&self) -> OutputStats {
            self.counters.snapshot()
        }

        fn stop(&mut self) {
            if let Some(stream) = self.stream.take() {
                if let Err(e) = stream.pause() {
                    warn!("Failed to pause stream: {}", e);
                }
            }
        }
    }

    /// Prefer an f32 config at the stream rate, else the device default
    fn best_config(device: &cpal::Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::Output(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate
                && config.sample_format() == SampleFormat::F32
        });
        if let Some(config) = preferred {
            let format = config.sample_format();
            return Ok((config.with_sample_rate(cpal::SampleRate(sample_rate)).config(), format));
        }

        let config = device
            .default_output_config()
            .map_err(|e| Error::Output(format!("Failed to get default config: {}", e)))?;
        Ok((config.config(), config.sample_format()))
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut engine: ClientPlaybackEngine,
        counters: Arc<RenderCounters>,
    ) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let mut mono: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    mono.resize(frames, 0.0);
                    counters.record(engine.render(&mut mono));

                    for (frame, sample) in data.chunks_mut(channels).zip(mono.iter()) {
                        let value = T::from_sample(sample.clamp(-1.0, 1.0));
                        frame.fill(value);
                    }
                },
                move |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Output(format!("Failed to build stream: {}", e)))
    }
}
