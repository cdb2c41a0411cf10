//! Window selection on periodic ticks.
//!
//! Sample arrival and window production are decoupled: the scheduler runs on
//! its own period and a tick with too little data is simply a no-op.

use crate::core::buffer::SharedSampleBuffer;
use crate::source::types::Sample;
use serde::{Deserialize, Serialize};

/// What to do when fewer than `target_size` samples are buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Always wait for a full window.
    #[default]
    Strict,
    /// Require a full first window, then accept whatever is buffered so the
    /// tick cadence survives short dropouts.
    WarmStartTolerant,
}

/// A run of recent samples selected for one round of feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    /// Samples in arrival order
    pub samples: Vec<Sample>,
    /// Length the window is logically extended to before transforming
    pub transform_len: usize,
    /// Sampling rate the window is interpreted at
    pub sample_rate_hz: f64,
}

impl Window {
    /// A window whose transform length equals its sample count.
    pub fn new(samples: Vec<Sample>, sample_rate_hz: f64) -> Self {
        let transform_len = samples.len();
        Self {
            samples,
            transform_len,
            sample_rate_hz,
        }
    }

    /// A window logically extended to `transform_len` samples.
    pub fn padded(samples: Vec<Sample>, transform_len: usize, sample_rate_hz: f64) -> Self {
        let transform_len = transform_len.max(samples.len());
        Self {
            samples,
            transform_len,
            sample_rate_hz,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the window carries fewer real samples than its transform length.
    pub fn is_padded(&self) -> bool {
        self.samples.len() < self.transform_len
    }

    pub fn start_time(&self) -> Option<i64> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn end_time(&self) -> Option<i64> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Rate implied by the timestamps, if the window spans any time at all.
    pub fn measured_rate_hz(&self) -> Option<f64> {
        let span_ms = self.end_time()? - self.start_time()?;
        if span_ms <= 0 || self.samples.len() < 2 {
            return None;
        }
        Some((self.samples.len() - 1) as f64 * 1000.0 / span_ms as f64)
    }
}

/// Decides on each tick whether a window can be produced.
#[derive(Debug, Clone)]
pub struct WindowScheduler {
    policy: ReadinessPolicy,
    sample_rate_hz: f64,
    last_window_time: Option<i64>,
}

impl WindowScheduler {
    pub fn new(policy: ReadinessPolicy, sample_rate_hz: f64) -> Self {
        Self {
            policy,
            sample_rate_hz,
            last_window_time: None,
        }
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    /// Tick time of the last window produced, `None` before the first one.
    pub fn last_window_time(&self) -> Option<i64> {
        self.last_window_time
    }

    /// Select a window from `buffer` if the readiness policy allows it.
    pub fn maybe_build_window(
        &mut self,
        now: i64,
        buffer: &SharedSampleBuffer,
        target_size: usize,
    ) -> Option<Window> {
        // Snapshot under one lock so the count and the samples agree.
        let samples = buffer.snapshot_latest(target_size);
        let available = samples.len();

        if available == 0 {
            tracing::debug!("No samples buffered, skipping tick");
            return None;
        }

        let full = available >= target_size;
        let accept = match self.policy {
            ReadinessPolicy::Strict => full,
            ReadinessPolicy::WarmStartTolerant => full || self.last_window_time.is_some(),
        };

        if !accept {
            tracing::debug!(
                available,
                required = target_size,
                "Not enough samples for a window"
            );
            return None;
        }

        self.last_window_time = Some(now);
        if full {
            Some(Window::new(samples, self.sample_rate_hz))
        } else {
            tracing::debug!(available, target_size, "Building padded window");
            Some(Window::padded(samples, target_size, self.sample_rate_hz))
        }
    }

    /// Forget the last window so the next one must be full again.
    pub fn reset(&mut self) {
        self.last_window_time = None;
    }
}

/// Split a recording into overlapping fixed-size windows.
///
/// `overlap` is the shared fraction between consecutive windows (0.5 gives
/// a step of half a window). Trailing samples that do not fill a window are
/// dropped.
pub fn segment(
    samples: &[Sample],
    window_samples: usize,
    overlap: f64,
    sample_rate_hz: f64,
) -> Vec<Window> {
    if window_samples == 0 || samples.len() < window_samples {
        return Vec::new();
    }

    let overlap = overlap.clamp(0.0, 0.99);
    let step = ((window_samples as f64 * (1.0 - overlap)) as usize).max(1);

    (0..=samples.len() - window_samples)
        .step_by(step)
        .map(|start| Window::new(samples[start..start + window_samples].to_vec(), sample_rate_hz))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn filled_buffer(count: usize) -> SharedSampleBuffer {
        let buffer = SharedSampleBuffer::new(Duration::from_secs(60));
        for i in 0..count {
            buffer.add_sample(Sample::new(i as i64 * 20, 0.0, 0.0, 9.81));
        }
        buffer
    }

    #[test]
    fn test_empty_buffer_yields_none() {
        let buffer = filled_buffer(0);
        for policy in [ReadinessPolicy::Strict, ReadinessPolicy::WarmStartTolerant] {
            let mut scheduler = WindowScheduler::new(policy, 50.0);
            assert!(scheduler.maybe_build_window(0, &buffer, 10).is_none());
        }
    }

    #[test]
    fn test_strict_window_length() {
        let mut scheduler = WindowScheduler::new(ReadinessPolicy::Strict, 50.0);
        for count in [1, 99, 100, 101, 400] {
            let buffer = filled_buffer(count);
            let window = scheduler.maybe_build_window(1_000, &buffer, 100);
            if count < 100 {
                assert!(window.is_none(), "count {count}");
            } else {
                let window = window.unwrap();
                assert_eq!(window.len(), 100);
                assert_eq!(window.transform_len, 100);
                assert!(!window.is_padded());
            }
        }
    }

    #[test]
    fn test_strict_selects_most_recent_samples() {
        let buffer = filled_buffer(300);
        let mut scheduler = WindowScheduler::new(ReadinessPolicy::Strict, 50.0);
        let window = scheduler.maybe_build_window(7, &buffer, 250).unwrap();
        assert_eq!(window.start_time(), Some(50 * 20));
        assert_eq!(window.end_time(), Some(299 * 20));
        assert_eq!(scheduler.last_window_time(), Some(7));
    }

    #[test]
    fn test_short_tick_strict_vs_tolerant() {
        let short = filled_buffer(50);

        let mut strict = WindowScheduler::new(ReadinessPolicy::Strict, 50.0);
        assert!(strict.maybe_build_window(0, &short, 250).is_none());

        let mut tolerant = WindowScheduler::new(ReadinessPolicy::WarmStartTolerant, 50.0);
        // The first window must still be full.
        assert!(tolerant.maybe_build_window(0, &short, 250).is_none());
        assert!(tolerant.last_window_time().is_none());

        let full = filled_buffer(250);
        assert!(tolerant.maybe_build_window(2_500, &full, 250).is_some());

        let window = tolerant.maybe_build_window(5_000, &short, 250).unwrap();
        assert_eq!(window.len(), 50);
        assert_eq!(window.transform_len, 250);
        assert!(window.is_padded());
        assert_eq!(tolerant.last_window_time(), Some(5_000));
    }

    #[test]
    fn test_measured_rate() {
        let window = Window::new(
            (0..11).map(|i| Sample::new(i * 20, 0.0, 0.0, 0.0)).collect(),
            50.0,
        );
        assert!((window.measured_rate_hz().unwrap() - 50.0).abs() < 1e-9);

        let single = Window::new(vec![Sample::new(0, 0.0, 0.0, 0.0)], 50.0);
        assert!(single.measured_rate_hz().is_none());
    }

    #[test]
    fn test_segment_half_overlap() {
        let samples: Vec<Sample> = (0..1_000).map(|i| Sample::new(i * 20, 0.0, 0.0, 0.0)).collect();
        let windows = segment(&samples, 250, 0.5, 50.0);
        // Starts at 0, 125, ..., 750
        assert_eq!(windows.len(), 7);
        assert!(windows.iter().all(|w| w.len() == 250));
        assert_eq!(windows[1].start_time(), Some(125 * 20));

        assert!(segment(&samples[..100], 250, 0.5, 50.0).is_empty());
    }
}
