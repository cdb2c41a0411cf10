//! Sample sources feeding the pipeline.
//!
//! Real sensor acquisition lives outside this crate. These sources cover the
//! two cases the agent handles itself: a synthetic generator and replay of
//! recorded sessions.

pub mod recording;
pub mod synthetic;
pub mod types;

use thiserror::Error;

pub use recording::{load_recording, parse_recording, ReplaySource};
pub use synthetic::{SyntheticConfig, SyntheticSource, GRAVITY};
pub use types::Sample;

/// Errors raised by sample sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source is already running")]
    AlreadyRunning,
    #[error("Invalid sample rate: {0} Hz")]
    InvalidRate(f64),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Recording parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}
