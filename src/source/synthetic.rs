//! Synthetic accelerometer source.
//!
//! Emits a gravity-offset sinusoid on a background thread at a fixed rate.
//! Used by the CLI and demos when no recording is supplied.

use crate::source::types::Sample;
use crate::source::SourceError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Standard gravity in m/s².
pub const GRAVITY: f64 = 9.81;

/// Shape of the generated motion.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Output rate in Hz
    pub sample_rate_hz: f64,
    /// Frequency of the oscillation on the x axis
    pub motion_hz: f64,
    /// Peak amplitude of the oscillation
    pub amplitude: f64,
    /// Constant offset on the x axis (gravity when the device is upright)
    pub offset: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50.0,
            motion_hz: 1.0,
            amplitude: 1.0,
            offset: GRAVITY,
        }
    }
}

impl SyntheticConfig {
    /// Sample at position `index` of the generated stream.
    pub fn sample_at(&self, index: u64, start_ms: i64) -> Sample {
        let t = index as f64 / self.sample_rate_hz;
        let x = self.offset + self.amplitude * (2.0 * std::f64::consts::PI * self.motion_hz * t).sin();
        Sample::new(start_ms + (t * 1000.0).round() as i64, x, 0.0, 0.0)
    }
}

/// Background generator that pushes samples into a bounded channel.
pub struct SyntheticSource {
    config: SyntheticConfig,
    sender: Sender<Sample>,
    receiver: Receiver<Sample>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Start generating samples.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        if self.config.sample_rate_hz <= 0.0 {
            return Err(SourceError::InvalidRate(self.config.sample_rate_hz));
        }
        self.running.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let sender = self.sender.clone();
        let running = self.running.clone();
        let period = Duration::from_secs_f64(1.0 / config.sample_rate_hz);

        self.worker = Some(thread::spawn(move || {
            let start_ms = chrono::Utc::now().timestamp_millis();
            let mut index = 0u64;
            while running.load(Ordering::SeqCst) {
                // Drop samples rather than block when nobody is draining.
                let _ = sender.try_send(config.sample_at(index, start_ms));
                index += 1;
                thread::sleep(period);
            }
        }));

        tracing::info!(
            rate_hz = self.config.sample_rate_hz,
            motion_hz = self.config.motion_hz,
            "Synthetic source started"
        );
        Ok(())
    }

    /// Stop generating samples and join the worker thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiver for generated samples.
    pub fn receiver(&self) -> &Receiver<Sample> {
        &self.receiver
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}
