//! Motion Spectrum Agent - streaming accelerometer activity classification.
//!
//! This library turns a live tri-axial accelerometer stream into periodic
//! activity predictions. Samples land in a time-bounded buffer, a tick
//! selects the latest window, the window's magnitude signal is band-passed
//! in the frequency domain and its spectrum is handed to a classifier.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Motion Spectrum Agent                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │   Source    │──▶│   Sample    │──▶│  Window     │  every tick │
//! │  │ (thread)    │   │   Buffer    │   │  Scheduler  │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! │                                             │                    │
//! │                                             ▼                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │   Events    │◀──│ Classifier  │◀──│  Spectral   │             │
//! │  │  (mpsc)     │   │ local/remote│   │  Features   │             │
//! │  └─────────────┘   └─────────────┘   └─────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use motion_spectrum_agent::{pipeline, stats, Config, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let classifier = pipeline::build_classifier(&config)?;
//! let (mut pipeline, mut events) =
//!     Pipeline::new(config, classifier, stats::create_shared_stats())?;
//!
//! // Feed samples through pipeline.buffer(), then:
//! let cancel = CancellationToken::new();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//! pipeline.run(cancel).await;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod source;
pub mod stats;

// Re-export key types at crate root for convenience
pub use classifier::{ClassificationResult, Classifier, ClassifierError, FailureKind, LabelSet};
pub use config::{ClassifierConfig, Config, ConfigError, RemoteConfig};
pub use core::{
    FeatureExtractor, FilterPolicy, ReadinessPolicy, SampleBuffer, SharedSampleBuffer,
    SpectralFilter, Spectrum, Window, WindowScheduler,
};
pub use pipeline::{Pipeline, PipelineError, PipelineEvent, TickOutcome};
pub use source::Sample;
pub use stats::{PipelineStats, SharedPipelineStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
