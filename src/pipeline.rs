//! Tick-driven orchestration of buffer, windowing, features and classifier.
//!
//! Samples flow in from an ingestion thread that only ever touches the shared
//! buffer. Every tick asks the scheduler for a window, extracts its spectrum
//! and dispatches one classification on a tokio task. Results come back on an
//! event channel, so a slow classifier never holds up ingestion or ticking.
//!
//! At most one classification is in flight. A newer window aborts the pending
//! call, which is reported as [`PipelineEvent::Abandoned`].

use crate::classifier::{
    ClassificationResult, Classifier, ClassifierError, FailureKind, LinearModel, LocalClassifier,
};
use crate::config::{ClassifierConfig, Config, ConfigError};
use crate::core::{DspError, FeatureExtractor, SharedSampleBuffer, WindowScheduler};
use crate::source::Sample;
use crate::stats::SharedPipelineStats;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors that stop the pipeline from being built or from handling a tick.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Window size {window_size} yields {spectrum_len} bins but classifier expects {classifier_len}")]
    InputMismatch {
        window_size: usize,
        spectrum_len: usize,
        classifier_len: usize,
    },

    #[error("Feature extraction failed: {0}")]
    Dsp(#[from] DspError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The readiness policy rejected the buffered samples.
    Skipped { available: usize, required: usize },
    /// A window was built and handed to the classifier.
    Dispatched {
        seq: u64,
        samples: usize,
        padded: bool,
    },
}

/// Classification outcomes delivered to consumers.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Classified {
        seq: u64,
        /// Timestamp of the newest sample in the window
        window_end: Option<i64>,
        result: ClassificationResult,
    },
    Failed {
        seq: u64,
        kind: FailureKind,
        error: String,
    },
    /// Superseded by a newer window before it completed
    Abandoned { seq: u64 },
}

impl PipelineEvent {
    pub fn seq(&self) -> u64 {
        match self {
            PipelineEvent::Classified { seq, .. }
            | PipelineEvent::Failed { seq, .. }
            | PipelineEvent::Abandoned { seq } => *seq,
        }
    }
}

struct InFlight {
    seq: u64,
    handle: JoinHandle<()>,
    /// Set by whichever side reports this seq first: the task or an abandon.
    reported: Arc<AtomicBool>,
}

fn claim(reported: &AtomicBool) -> bool {
    reported
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Live motion classification pipeline.
pub struct Pipeline {
    config: Config,
    buffer: SharedSampleBuffer,
    scheduler: WindowScheduler,
    extractor: FeatureExtractor,
    classifier: Arc<dyn Classifier>,
    stats: SharedPipelineStats,
    events: mpsc::UnboundedSender<PipelineEvent>,
    in_flight: Option<InFlight>,
    next_seq: u64,
    instance_id: Uuid,
}

impl Pipeline {
    /// Build a pipeline and the receiving end of its event channel.
    ///
    /// Fails if the configuration is invalid or the classifier's input size
    /// differs from the spectrum length of a full window.
    pub fn new(
        config: Config,
        classifier: Arc<dyn Classifier>,
        stats: SharedPipelineStats,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PipelineEvent>), PipelineError> {
        config.validate()?;

        let spectrum_len = config.spectrum_len();
        if classifier.input_len() != spectrum_len {
            return Err(PipelineError::InputMismatch {
                window_size: config.target_window_size,
                spectrum_len,
                classifier_len: classifier.input_len(),
            });
        }

        let extractor = FeatureExtractor::new(config.filter.build()?);
        let (events, receiver) = mpsc::unbounded_channel();
        let instance_id = Uuid::new_v4();

        tracing::info!(
            %instance_id,
            classifier = classifier.name(),
            window_size = config.target_window_size,
            spectrum_len,
            readiness = ?config.readiness,
            "Pipeline created"
        );

        let pipeline = Self {
            buffer: SharedSampleBuffer::new(config.window_duration),
            scheduler: WindowScheduler::new(config.readiness, config.sample_rate_hz),
            extractor,
            classifier,
            stats,
            events,
            in_flight: None,
            next_seq: 1,
            instance_id,
            config,
        };
        Ok((pipeline, receiver))
    }

    /// Handle for pushing samples into the pipeline.
    pub fn buffer(&self) -> SharedSampleBuffer {
        self.buffer.clone()
    }

    pub fn stats(&self) -> &SharedPipelineStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Whether a classification is still pending.
    pub fn is_busy(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| !f.reported.load(Ordering::Acquire))
    }

    /// Run one scheduling step at `now_ms`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(&mut self, now_ms: i64) -> Result<TickOutcome, PipelineError> {
        let required = self.config.target_window_size;
        let Some(window) = self
            .scheduler
            .maybe_build_window(now_ms, &self.buffer, required)
        else {
            self.stats.record_tick_skipped();
            return Ok(TickOutcome::Skipped {
                available: self.buffer.len(),
                required,
            });
        };

        let spectrum = self.extractor.extract(&window)?;
        self.stats.record_window_built();

        self.abandon_in_flight();

        let seq = self.next_seq;
        self.next_seq += 1;

        let classifier = self.classifier.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        let timeout = self.config.classification_timeout();
        let window_end = window.end_time();

        let reported = Arc::new(AtomicBool::new(false));
        let task_reported = reported.clone();

        let handle = tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, classifier.classify(&spectrum)).await;
            if !claim(&task_reported) {
                // Already reported as abandoned.
                return;
            }
            let event = match outcome {
                Ok(Ok(result)) => {
                    stats.record_success();
                    tracing::debug!(seq, label = %result.predicted_label, "Window classified");
                    PipelineEvent::Classified {
                        seq,
                        window_end,
                        result,
                    }
                }
                Ok(Err(e)) => {
                    stats.record_failure();
                    tracing::warn!(seq, error = %e, "Classification failed");
                    PipelineEvent::Failed {
                        seq,
                        kind: e.kind(),
                        error: e.to_string(),
                    }
                }
                Err(_) => {
                    stats.record_failure();
                    let e = ClassifierError::Timeout(timeout);
                    tracing::warn!(seq, error = %e, "Classification timed out");
                    PipelineEvent::Failed {
                        seq,
                        kind: e.kind(),
                        error: e.to_string(),
                    }
                }
            };
            // Receiver gone means nobody is listening any more.
            let _ = events.send(event);
        });

        self.in_flight = Some(InFlight {
            seq,
            handle,
            reported,
        });

        Ok(TickOutcome::Dispatched {
            seq,
            samples: window.len(),
            padded: window.is_padded(),
        })
    }

    fn abandon_in_flight(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            if claim(&previous.reported) {
                previous.handle.abort();
                self.stats.record_abandoned();
                tracing::info!(seq = previous.seq, "Abandoning stale classification");
                let _ = self.events.send(PipelineEvent::Abandoned { seq: previous.seq });
            }
        }
    }

    /// Tick on the configured period until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(period = ?self.config.tick_period, "Tick loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {
                    let now = chrono::Utc::now().timestamp_millis();
                    match self.tick(now) {
                        Ok(TickOutcome::Skipped { available, required }) => {
                            tracing::debug!(available, required, "Tick skipped");
                        }
                        Ok(TickOutcome::Dispatched { seq, samples, padded }) => {
                            tracing::debug!(seq, samples, padded, "Window dispatched");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Tick failed");
                        }
                    }
                }
            }
        }

        self.shutdown();
    }

    /// Abort any pending classification and persist statistics.
    pub fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
        if let Err(e) = self.stats.save() {
            tracing::warn!(error = %e, "Could not save statistics");
        }
        tracing::info!(instance_id = %self.instance_id, "Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
    }
}

/// Build the classifier a configuration describes.
pub fn build_classifier(config: &Config) -> Result<Arc<dyn Classifier>, PipelineError> {
    let labels = config.labels.clone();
    match config.classifier {
        ClassifierConfig::Local { ref model_path } => {
            let model = LinearModel::load(model_path)?;
            Ok(Arc::new(LocalClassifier::new(Arc::new(model), labels)?))
        }
        #[cfg(feature = "remote")]
        ClassifierConfig::Remote(ref remote) => Ok(Arc::new(
            crate::classifier::RemoteClassifier::new(remote.clone(), labels, config.spectrum_len())?,
        )),
        #[cfg(not(feature = "remote"))]
        ClassifierConfig::Remote(_) => Err(ClassifierError::Setup(
            "remote classifier support is not compiled in".to_string(),
        )
        .into()),
    }
}

/// Drain `receiver` into `buffer` on a dedicated thread.
///
/// The thread exits when the sender side disconnects or `cancel` fires.
pub fn spawn_ingestion(
    receiver: Receiver<Sample>,
    buffer: SharedSampleBuffer,
    stats: SharedPipelineStats,
    cancel: CancellationToken,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !cancel.is_cancelled() {
            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(sample) => {
                    buffer.add_sample(sample);
                    stats.record_sample();
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("Sample source disconnected");
                    break;
                }
            }
        }
    })
}
