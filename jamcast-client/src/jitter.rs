//! Jitter buffer between the network receiver and the output callback
//!
//! A bounded lock-free single-producer single-consumer queue of mono `f32`
//! samples. The receiver owns the producer half and the playback engine the
//! consumer half; neither takes a lock on the sample path.
//!
//! When the queue is full the producer *waits* instead of dropping audio:
//! the receiver stops reading the socket, which in turn pushes back on the
//! server through TCP flow control. Every consumer read wakes it.

use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

struct Shared {
    /// Signalled whenever the consumer frees space or goes away
    space: Notify,
    consumer_gone: AtomicBool,
    underruns: AtomicU64,
    samples_pushed: AtomicU64,
}

/// Point-in-time buffer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterStats {
    /// Output callbacks that found too few samples while playing
    pub underruns: u64,
    pub samples_pushed: u64,
    pub capacity: usize,
    pub occupied: usize,
}

/// Unsplit jitter buffer
pub struct JitterBuffer {
    buffer: HeapRb<f32>,
    shared: Arc<Shared>,
}

impl JitterBuffer {
    /// # Panics
    /// If `capacity` is zero; configuration validation rejects that earlier.
    pub fn new(capacity: usize) -> Self {
        debug!("Creating jitter buffer with capacity: {} samples", capacity);
        Self {
            buffer: HeapRb::new(capacity),
            shared: Arc::new(Shared {
                space: Notify::new(),
                consumer_gone: AtomicBool::new(false),
                underruns: AtomicU64::new(0),
                samples_pushed: AtomicU64::new(0),
            }),
        }
    }

    /// Producer half for the receiver, consumer half for the playback engine
    pub fn split(self) -> (JitterProducer, JitterConsumer) {
        let (producer, consumer) = self.buffer.split();
        (
            JitterProducer {
                producer,
                shared: Arc::clone(&self.shared),
            },
            JitterConsumer {
                consumer,
                shared: self.shared,
            },
        )
    }
}

pub struct JitterProducer {
    producer: HeapProd<f32>,
    shared: Arc<Shared>,
}

impl JitterProducer {
    /// Queue every sample, waiting for the consumer whenever the buffer is full
    ///
    /// A chunk larger than the capacity goes in piece by piece. Returns
    /// `false` if the consumer was dropped before everything was queued.
    pub async fn push(&mut self, samples: &[f32]) -> bool {
        let mut rest = samples;
        loop {
            let written = self.try_push(rest);
            rest = &rest[written..];
            if rest.is_empty() {
                return true;
            }
            if self.shared.consumer_gone.load(Ordering::Acquire) {
                return false;
            }
            trace!("Jitter buffer full, {} samples waiting", rest.len());
            self.shared.space.notified().await;
        }
    }

    /// Queue as many samples as fit right now
    pub fn try_push(&mut self, samples: &[f32]) -> usize {
        let written = self.producer.push_slice(samples);
        self.shared
            .samples_pushed
            .fetch_add(written as u64, Ordering::Relaxed);
        written
    }

    pub fn occupied_len(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().into()
    }

    pub fn stats(&self) -> JitterStats {
        JitterStats {
            underruns: self.shared.underruns.load(Ordering::Relaxed),
            samples_pushed: self.shared.samples_pushed.load(Ordering::Relaxed),
            capacity: self.capacity(),
            occupied: self.occupied_len(),
        }
    }
}

pub struct JitterConsumer {
    consumer: HeapCons<f32>,
    shared: Arc<Shared>,
}

impl JitterConsumer {
    /// Fill `out` completely or not at all
    ///
    /// Never blocks; safe to call from the real-time audio callback.
    pub fn pop_exact(&mut self, out: &mut [f32]) -> bool {
        if self.consumer.occupied_len() < out.len() {
            return false;
        }
        self.consumer.pop_slice(out);
        self.shared.space.notify_one();
        true
    }

    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Count one underrun; returns the new total
    pub fn record_underrun(&self) -> u64 {
        self.shared.underruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn stats(&self) -> JitterStats {
        JitterStats {
            underruns: self.shared.underruns.load(Ordering::Relaxed),
            samples_pushed: self.shared.samples_pushed.load(Ordering::Relaxed),
            capacity: self.consumer.capacity().into(),
            occupied: self.consumer.occupied_len(),
        }
    }
}

impl Drop for JitterConsumer {
    fn drop(&mut self) {
        self.shared.consumer_gone.store(true, Ordering::Release);
        self.shared.space.notify_one();
    }
}
