//! Core signal path of the agent.
//!
//! This module contains:
//! - The time-bounded sample buffer
//! - Tick-driven window selection
//! - Frequency-domain band-pass filtering
//! - Spectral feature extraction

pub mod buffer;
pub mod features;
pub mod filter;
pub mod windowing;

// Re-export commonly used types
pub use buffer::{SampleBuffer, SharedSampleBuffer};
pub use features::{
    half_spectrum, magnitude_series, spectrum_len, FeatureExtractor, Spectrum,
    DEFAULT_HIGH_CUT_HZ, DEFAULT_LOW_CUT_HZ,
};
pub use filter::{DspError, FilterPolicy, SpectralFilter};
pub use windowing::{segment, ReadinessPolicy, Window, WindowScheduler};
