//! Activity classification of spectra.
//!
//! Every backend implements [`Classifier`]: an in-process model
//! ([`LocalClassifier`]) or a remote inference endpoint
//! (`RemoteClassifier`, behind the `remote` feature). Both normalise their
//! output into a [`ClassificationResult`] aligned with the configured
//! [`LabelSet`].

pub mod local;
#[cfg(feature = "remote")]
pub mod remote;

use crate::core::Spectrum;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use local::{LinearModel, LocalClassifier, ScoreModel};
#[cfg(feature = "remote")]
pub use remote::{PredictResponse, RemoteClassifier};

/// Activities the bundled models were trained on, in model output order.
pub const DEFAULT_LABELS: [&str; 6] = [
    "climbing_stairs",
    "descending_stairs",
    "nothing",
    "running",
    "sitting_standing",
    "walking",
];

/// Ordered list of class labels. Index i names model output i.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(ClassifierError::Setup("label set is empty".to_string()));
        }
        Ok(Self(labels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect())
    }
}

/// Index of the largest value; ties go to the lowest index, NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, bv)) if bv >= v => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Outcome of classifying one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub predicted_label: String,
    pub predicted_index: usize,
    /// Per-label scores in label-set order
    pub probabilities: Vec<(String, f32)>,
}

impl ClassificationResult {
    /// Pair raw scores with their labels and pick the argmax.
    ///
    /// Scores are not required to sum to one.
    pub fn from_scores(labels: &LabelSet, scores: &[f32]) -> Result<Self, ClassifierError> {
        if scores.len() != labels.len() {
            return Err(ClassifierError::MalformedResponse(format!(
                "expected {} scores, got {}",
                labels.len(),
                scores.len()
            )));
        }
        let predicted_index = argmax(scores).ok_or_else(|| {
            ClassifierError::MalformedResponse("no comparable scores".to_string())
        })?;
        let predicted_label = labels
            .get(predicted_index)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            predicted_label,
            predicted_index,
            probabilities: labels
                .iter()
                .zip(scores)
                .map(|(label, &p)| (label.to_string(), p))
                .collect(),
        })
    }

    /// Score of the predicted label.
    pub fn confidence(&self) -> f32 {
        self.probabilities
            .get(self.predicted_index)
            .map_or(0.0, |(_, p)| *p)
    }
}

impl std::fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:.4})", self.predicted_label, self.confidence())
    }
}

/// Errors raised while classifying a spectrum.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Classifier unreachable: {0}")]
    Connection(String),

    #[error("Classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("Classifier returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("Spectrum length mismatch: expected {expected}, got {actual}")]
    InputLength { expected: usize, actual: usize },

    #[error("Classifier setup error: {0}")]
    Setup(String),
}

/// Coarse failure categories reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Endpoint unreachable, timed out or refused the request
    ClassifierUnavailable,
    /// Endpoint answered with something that is not a classification
    MalformedResponse,
    /// Spectrum or model shape does not match the configuration
    InvalidInput,
}

impl ClassifierError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClassifierError::Connection(_)
            | ClassifierError::Timeout(_)
            | ClassifierError::Status { .. } => FailureKind::ClassifierUnavailable,
            ClassifierError::MalformedResponse(_) => FailureKind::MalformedResponse,
            ClassifierError::InputLength { .. } | ClassifierError::Setup(_) => {
                FailureKind::InvalidInput
            }
        }
    }

    /// Whether the pipeline should simply carry on with the next window.
    pub fn is_transient(&self) -> bool {
        !matches!(self.kind(), FailureKind::InvalidInput)
    }
}

/// A backend that turns spectra into label scores.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn labels(&self) -> &LabelSet;

    /// Spectrum length the backend expects.
    fn input_len(&self) -> usize;

    async fn classify(&self, spectrum: &Spectrum) -> Result<ClassificationResult, ClassifierError>;
}
