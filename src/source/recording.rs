//! Recorded accelerometer sessions.
//!
//! Recordings use the collector's CSV layout: a `time,x,y,z` header followed
//! by one row per sample, `time` in milliseconds since recording start.

use crate::source::types::Sample;
use crate::source::SourceError;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest the replay thread blocks before rechecking its running flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Parse a recording from CSV text.
pub fn parse_recording(content: &str) -> Result<Vec<Sample>, SourceError> {
    let mut samples = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (index == 0 && line.starts_with("time")) {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(SourceError::Parse {
                line: index + 1,
                message: format!("expected 4 fields, found {}", fields.len()),
            });
        }

        let parse_err = |e: &dyn std::fmt::Display| SourceError::Parse {
            line: index + 1,
            message: e.to_string(),
        };
        let timestamp = fields[0]
            .parse::<f64>()
            .map_err(|e| parse_err(&e))?
            .round() as i64;
        let x = fields[1].parse::<f64>().map_err(|e| parse_err(&e))?;
        let y = fields[2].parse::<f64>().map_err(|e| parse_err(&e))?;
        let z = fields[3].parse::<f64>().map_err(|e| parse_err(&e))?;

        samples.push(Sample::new(timestamp, x, y, z));
    }

    // Segmentation and replay assume time order.
    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

/// Load a recording from disk.
pub fn load_recording(path: &Path) -> Result<Vec<Sample>, SourceError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| SourceError::IoError(e.to_string()))?;
    let samples = parse_recording(&content)?;
    tracing::debug!(path = %path.display(), samples = samples.len(), "Loaded recording");
    Ok(samples)
}

/// Replays a recording into a channel at its recorded pace.
pub struct ReplaySource {
    samples: Arc<Vec<Sample>>,
    receiver: Receiver<Sample>,
    sender: crossbeam_channel::Sender<Sample>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<Sample>) -> Self {
        let (sender, receiver) = bounded(10_000);
        Self {
            samples: Arc::new(samples),
            receiver,
            sender,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Start replaying. Timestamps are rebased onto the wall clock.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let samples = self.samples.clone();
        let sender = self.sender.clone();
        let running = self.running.clone();

        self.worker = Some(thread::spawn(move || {
            let Some(first) = samples.first() else {
                running.store(false, Ordering::SeqCst);
                return;
            };
            let base = chrono::Utc::now().timestamp_millis() - first.timestamp;
            let mut previous = first.timestamp;

            for sample in samples.iter() {
                let gap = (sample.timestamp - previous).max(0) as u64;
                if !sleep_while_running(&running, Duration::from_millis(gap)) {
                    break;
                }
                previous = sample.timestamp;

                let mut rebased = Sample {
                    timestamp: base + sample.timestamp,
                    ..*sample
                };
                loop {
                    match sender.send_timeout(rebased, STOP_POLL) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(back)) if running.load(Ordering::SeqCst) => {
                            rebased = back;
                        }
                        Err(_) => {
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
            tracing::info!("Recording replay finished");
        }));
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// Whether the replay is still producing samples.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &Receiver<Sample> {
        &self.receiver
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Sleep for `duration` in short slices. Returns false if `running` was cleared.
fn sleep_while_running(running: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(STOP_POLL));
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
    }
}
