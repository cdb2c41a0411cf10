//! Time-bounded sample buffer.
//!
//! The buffer keeps twice the window duration of history. Eviction runs on
//! every insert so its size is bounded by the sampling rate alone.

use crate::source::types::Sample;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Ordered run of recent samples.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    retention_ms: i64,
    latest_timestamp: Option<i64>,
}

impl SampleBuffer {
    /// Create a buffer retaining `2 × window_duration` of samples.
    pub fn new(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_ms: i64::try_from(window_duration.as_millis())
                .ok()
                .and_then(|ms| ms.checked_mul(2))
                .unwrap_or(i64::MAX),
            latest_timestamp: None,
        }
    }

    /// Append a sample and evict everything older than the retention span.
    pub fn add_sample(&mut self, sample: Sample) {
        let regressed = self
            .latest_timestamp
            .is_some_and(|latest| sample.timestamp < latest);
        let latest = self
            .latest_timestamp
            .map_or(sample.timestamp, |t| t.max(sample.timestamp));
        self.latest_timestamp = Some(latest);
        self.samples.push_back(sample);

        let cutoff = latest.saturating_sub(self.retention_ms);
        if regressed {
            tracing::debug!(
                timestamp = sample.timestamp,
                latest,
                "Out-of-order sample, running full eviction"
            );
            self.samples.retain(|s| s.timestamp >= cutoff);
        } else {
            while self.samples.front().is_some_and(|s| s.timestamp < cutoff) {
                self.samples.pop_front();
            }
        }
    }

    /// The most recent `n` samples in arrival order, or fewer if unavailable.
    pub fn snapshot_latest(&self, n: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Newest timestamp seen so far.
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.latest_timestamp
    }

    /// Retention span in milliseconds.
    pub fn retention_ms(&self) -> i64 {
        self.retention_ms
    }

    /// Oldest retained timestamp.
    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.samples.iter().map(|s| s.timestamp).min()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.latest_timestamp = None;
    }
}

/// Buffer handle shared between the ingestion thread and the tick loop.
///
/// A single mutex guards every mutation and snapshot, so readers never see a
/// partially appended state.
#[derive(Debug, Clone)]
pub struct SharedSampleBuffer {
    inner: Arc<Mutex<SampleBuffer>>,
}

impl SharedSampleBuffer {
    pub fn new(window_duration: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleBuffer::new(window_duration))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        // A panic while holding the lock cannot leave the deque torn, so the
        // poisoned guard is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_sample(&self, sample: Sample) {
        self.lock().add_sample(sample);
    }

    pub fn snapshot_latest(&self, n: usize) -> Vec<Sample> {
        self.lock().snapshot_latest(n)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` with exclusive access to the buffer.
    pub fn with<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        f(&self.lock())
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64) -> Sample {
        Sample::new(timestamp, 0.0, 0.0, 9.81)
    }

    fn assert_retention(buffer: &SampleBuffer) {
        let latest = buffer.latest_timestamp().unwrap();
        let cutoff = latest.saturating_sub(buffer.retention_ms());
        for s in buffer.snapshot_latest(usize::MAX) {
            assert!(s.timestamp >= cutoff, "{} older than {}", s.timestamp, cutoff);
        }
    }

    #[test]
    fn test_eviction_invariant_holds_after_every_insert() {
        let mut buffer = SampleBuffer::new(Duration::from_millis(1_000));
        // Irregular but non-decreasing spacing, including bursts and gaps.
        let mut t = 0i64;
        for i in 0..2_000 {
            t += match i % 7 {
                0 => 0,
                1 => 3,
                2 => 20,
                3 => 150,
                _ => 17,
            };
            buffer.add_sample(sample(t));
            assert_retention(&buffer);
        }
        assert!(buffer.len() > 0);
    }

    #[test]
    fn test_buffer_self_bounds_at_high_rate() {
        let mut buffer = SampleBuffer::new(Duration::from_millis(500));
        for t in 0..10_000 {
            buffer.add_sample(sample(t));
        }
        // 1 kHz for a 1 s retention span
        assert_eq!(buffer.len(), 1_001);
        assert_eq!(buffer.oldest_timestamp(), Some(10_000 - 1 - 1_000));
    }

    #[test]
    fn test_out_of_order_sample_keeps_invariant() {
        let mut buffer = SampleBuffer::new(Duration::from_millis(100));
        buffer.add_sample(sample(0));
        buffer.add_sample(sample(500));
        buffer.add_sample(sample(100));
        assert_retention(&buffer);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest_timestamp(), Some(500));
    }

    #[test]
    fn test_oversized_window_duration_retains_everything() {
        let mut buffer = SampleBuffer::new(Duration::from_millis(u64::MAX));
        assert_eq!(buffer.retention_ms(), i64::MAX);

        buffer.add_sample(sample(-5_000));
        buffer.add_sample(sample(0));
        buffer.add_sample(sample(1_700_000_000_000));
        assert_eq!(buffer.len(), 3);

        let half = SampleBuffer::new(Duration::from_millis(i64::MAX as u64 / 2 + 1));
        assert_eq!(half.retention_ms(), i64::MAX);
    }

    #[test]
    fn test_snapshot_latest_order_and_size() {
        let mut buffer = SampleBuffer::new(Duration::from_secs(5));
        for t in 0..10 {
            buffer.add_sample(sample(t * 20));
        }

        let latest = buffer.snapshot_latest(3);
        let times: Vec<i64> = latest.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![140, 160, 180]);

        assert_eq!(buffer.snapshot_latest(50).len(), 10);
        assert!(buffer.snapshot_latest(0).is_empty());
        // Snapshots never mutate.
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_shared_buffer_concurrent_access() {
        let shared = SharedSampleBuffer::new(Duration::from_secs(60));
        let writer = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for t in 0..5_000 {
                    shared.add_sample(sample(t));
                }
            })
        };

        for _ in 0..200 {
            let snapshot = shared.snapshot_latest(100);
            assert!(snapshot.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        writer.join().unwrap();
        assert_eq!(shared.len(), 5_000);
    }
}
