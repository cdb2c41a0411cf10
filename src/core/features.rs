//! Spectral feature extraction from sample windows.
//!
//! A window is reduced to its acceleration magnitude, band-pass filtered,
//! transformed again and folded into a half-spectrum of non-negative
//! magnitudes. The spectrum length is `floor(N/2) + 1` for a transform of
//! length N, which is the input size the classifier is trained on.

use crate::core::filter::{forward_real, DspError, SpectralFilter};
use crate::core::windowing::Window;
use serde::{Deserialize, Serialize};

/// Default high-pass edge, removes gravity and posture drift.
pub const DEFAULT_LOW_CUT_HZ: f64 = 0.4;

/// Default low-pass edge, above the band of human locomotion.
pub const DEFAULT_HIGH_CUT_HZ: f64 = 15.0;

/// Number of spectrum values produced by a transform of length `n`.
pub fn spectrum_len(n: usize) -> usize {
    n / 2 + 1
}

/// Half-spectrum magnitude vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Magnitudes from DC up to Nyquist
    pub values: Vec<f64>,
    /// Length of the transform that produced the values
    pub transform_len: usize,
    /// Sampling rate of the source signal
    pub sample_rate_hz: f64,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Frequency of bin `k` in Hz.
    pub fn bin_hz(&self, k: usize) -> f64 {
        k as f64 * self.sample_rate_hz / self.transform_len as f64
    }

    /// Index of the strongest non-DC bin.
    pub fn dominant_bin(&self) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .skip(1)
            .fold(None, |best: Option<(usize, f64)>, (k, &v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((k, v)),
            })
            .map(|(k, _)| k)
    }

    /// Values narrowed to `f32` for model input.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Per-sample acceleration magnitude of a window.
pub fn magnitude_series(window: &Window) -> Vec<f64> {
    window.samples.iter().map(|s| s.magnitude()).collect()
}

/// Fold the FFT of a real series into `floor(N/2) + 1` magnitudes.
pub fn half_spectrum(series: &[f64]) -> Result<Vec<f64>, DspError> {
    let bins = forward_real(series)?;
    let n = bins.len();
    let half = n / 2;

    let values = (0..=half)
        .map(|k| {
            if k == 0 || (n % 2 == 0 && k == half) {
                // DC and Nyquist are purely real for real input.
                bins[k].re.abs()
            } else {
                bins[k].norm()
            }
        })
        .collect();
    Ok(values)
}

/// Converts windows into spectra.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    filter: SpectralFilter,
}

impl FeatureExtractor {
    pub fn new(filter: SpectralFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> &SpectralFilter {
        &self.filter
    }

    /// Spectrum length produced for windows of `transform_len` samples.
    pub fn output_len(&self, transform_len: usize) -> usize {
        spectrum_len(transform_len)
    }

    /// Extract the spectrum of a window.
    ///
    /// Windows shorter than their transform length are filtered at their real
    /// length and zero-padded before the second transform, so the output
    /// length only depends on `window.transform_len`.
    pub fn extract(&self, window: &Window) -> Result<Spectrum, DspError> {
        let magnitudes = magnitude_series(window);
        let mut filtered = self.filter.apply(&magnitudes, window.sample_rate_hz)?;
        filtered.resize(window.transform_len.max(filtered.len()), 0.0);

        let values = half_spectrum(&filtered)?;
        tracing::trace!(
            samples = window.len(),
            transform_len = filtered.len(),
            bins = values.len(),
            "Extracted spectrum"
        );

        Ok(Spectrum {
            values,
            transform_len: filtered.len(),
            sample_rate_hz: window.sample_rate_hz,
        })
    }
}
