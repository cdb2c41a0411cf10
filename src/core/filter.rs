//! Frequency-domain band-pass filtering.
//!
//! The signal is transformed with a complex FFT, bins outside the pass band
//! are attenuated together with their conjugate mirrors (so the inverse stays
//! real), and the inverse transform is normalised by N.

use crate::core::features::{DEFAULT_HIGH_CUT_HZ, DEFAULT_LOW_CUT_HZ};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in spectral processing.
///
/// These are programmer or configuration errors and are never retried.
#[derive(Debug, Error, PartialEq)]
pub enum DspError {
    #[error("Transform size error: signal length must be non-zero")]
    EmptySignal,

    #[error("Invalid sampling rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid pass band: low {low} Hz, high {high} Hz")]
    InvalidBand { low: f64, high: f64 },
}

/// How out-of-band bins are attenuated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Hard zeroing of every bin outside the band.
    #[default]
    Masking,
    /// Fourth-order shelf gains on both edges of the band.
    Weighting,
}

/// Forward complex FFT of a real signal.
pub fn forward_real(signal: &[f64]) -> Result<Vec<Complex<f64>>, DspError> {
    if signal.is_empty() {
        return Err(DspError::EmptySignal);
    }
    let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(buffer.len()).process(&mut buffer);
    Ok(buffer)
}

/// Inverse FFT normalised by N, keeping the real part.
pub fn inverse_real(mut bins: Vec<Complex<f64>>) -> Result<Vec<f64>, DspError> {
    if bins.is_empty() {
        return Err(DspError::EmptySignal);
    }
    let n = bins.len();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(n).process(&mut bins);
    let scale = 1.0 / n as f64;
    Ok(bins.into_iter().map(|c| c.re * scale).collect())
}

/// Band-limits real, evenly spaced signals.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFilter {
    policy: FilterPolicy,
    low_cut_hz: f64,
    high_cut_hz: f64,
}

impl SpectralFilter {
    pub fn new(policy: FilterPolicy, low_cut_hz: f64, high_cut_hz: f64) -> Result<Self, DspError> {
        if !(low_cut_hz >= 0.0 && high_cut_hz > low_cut_hz && high_cut_hz.is_finite()) {
            return Err(DspError::InvalidBand {
                low: low_cut_hz,
                high: high_cut_hz,
            });
        }
        Ok(Self {
            policy,
            low_cut_hz,
            high_cut_hz,
        })
    }

    pub fn policy(&self) -> FilterPolicy {
        self.policy
    }

    pub fn band(&self) -> (f64, f64) {
        (self.low_cut_hz, self.high_cut_hz)
    }

    /// Filter `signal` sampled at `fs` Hz. Output length equals input length.
    pub fn apply(&self, signal: &[f64], fs: f64) -> Result<Vec<f64>, DspError> {
        if !(fs > 0.0 && fs.is_finite()) {
            return Err(DspError::InvalidSampleRate(fs));
        }
        let mut bins = forward_real(signal)?;
        match self.policy {
            FilterPolicy::Masking => self.mask(&mut bins, fs),
            FilterPolicy::Weighting => self.weight(&mut bins, fs),
        }
        inverse_real(bins)
    }

    fn mask(&self, bins: &mut [Complex<f64>], fs: f64) {
        let n = bins.len();
        let half = n / 2;
        let resolution = fs / n as f64;
        let zero = Complex::new(0.0, 0.0);

        if self.low_cut_hz > 0.0 {
            bins[0] = zero;
        }

        if n % 2 == 0 && n > 1 {
            let nyquist = fs / 2.0;
            if nyquist < self.low_cut_hz || nyquist > self.high_cut_hz {
                bins[half] = zero;
            }
        }

        let first_kept = (self.low_cut_hz / resolution).ceil();
        let last_kept = (self.high_cut_hz / resolution).floor();
        // Bins strictly between DC and Nyquist; for odd N that is 1..=N/2.
        let last = if n % 2 == 0 { half.saturating_sub(1) } else { half };

        for k in 1..=last {
            let kf = k as f64;
            if kf < first_kept || kf > last_kept {
                bins[k] = zero;
                bins[n - k] = zero;
            }
        }
    }

    fn weight(&self, bins: &mut [Complex<f64>], fs: f64) {
        let n = bins.len();
        let resolution = fs / n as f64;

        for k in 0..=n / 2 {
            let gain = self.gain(k as f64 * resolution);
            bins[k] *= gain;
            let mirror = n - k;
            if k != 0 && mirror != k {
                bins[mirror] *= gain;
            }
        }
    }

    /// Shelf gain at `freq` Hz for the weighting policy.
    pub fn gain(&self, freq: f64) -> f64 {
        let low_weight = if self.low_cut_hz <= 0.0 {
            1.0
        } else if freq <= 0.0 {
            0.0
        } else {
            1.0 / (1.0 + (self.low_cut_hz / freq).powi(4))
        };
        let high_weight = 1.0 / (1.0 + (freq / self.high_cut_hz).powi(4));
        low_weight * high_weight
    }
}

impl Default for SpectralFilter {
    fn default() -> Self {
        Self {
            policy: FilterPolicy::Masking,
            low_cut_hz: DEFAULT_LOW_CUT_HZ,
            high_cut_hz: DEFAULT_HIGH_CUT_HZ,
        }
    }
}
