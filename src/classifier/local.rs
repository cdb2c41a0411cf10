//! In-process classification.

use crate::classifier::{ClassificationResult, Classifier, ClassifierError, LabelSet};
use crate::core::Spectrum;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A model scoring a `[1, input_len]` feature vector.
///
/// Scores are per label and need not form a probability distribution.
pub trait ScoreModel: Send + Sync {
    fn input_len(&self) -> usize;

    fn output_len(&self) -> usize;

    fn predict(&self, input: &[f32]) -> Vec<f32>;
}

/// Dense layer with optional softmax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    /// One row of input weights per output class
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub softmax: bool,
}

impl LinearModel {
    pub fn new(weights: Vec<Vec<f32>>, bias: Vec<f32>, softmax: bool) -> Result<Self, ClassifierError> {
        let model = Self {
            weights,
            bias,
            softmax,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load a model from its JSON form.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClassifierError::Setup(format!("reading {path:?}: {e}")))?;
        let model: LinearModel = serde_json::from_str(&content)
            .map_err(|e| ClassifierError::Setup(format!("parsing {path:?}: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ClassifierError> {
        let Some(first) = self.weights.first() else {
            return Err(ClassifierError::Setup("model has no output rows".to_string()));
        };
        if first.is_empty() || self.weights.iter().any(|row| row.len() != first.len()) {
            return Err(ClassifierError::Setup(
                "model weight rows must be non-empty and equal length".to_string(),
            ));
        }
        if self.bias.len() != self.weights.len() {
            return Err(ClassifierError::Setup(format!(
                "bias has {} entries for {} outputs",
                self.bias.len(),
                self.weights.len()
            )));
        }
        Ok(())
    }
}

impl ScoreModel for LinearModel {
    fn input_len(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn output_len(&self) -> usize {
        self.weights.len()
    }

    fn predict(&self, input: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();

        if !self.softmax {
            return logits;
        }
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exp.iter().sum();
        exp.into_iter().map(|e| e / sum).collect()
    }
}

/// Classifier backed by an in-process [`ScoreModel`].
pub struct LocalClassifier {
    model: Arc<dyn ScoreModel>,
    labels: LabelSet,
}

impl LocalClassifier {
    /// The model must emit exactly one score per label.
    pub fn new(model: Arc<dyn ScoreModel>, labels: LabelSet) -> Result<Self, ClassifierError> {
        if model.output_len() != labels.len() {
            return Err(ClassifierError::Setup(format!(
                "model emits {} scores for {} labels",
                model.output_len(),
                labels.len()
            )));
        }
        Ok(Self { model, labels })
    }
}

#[async_trait]
impl Classifier for LocalClassifier {
    fn name(&self) -> &str {
        "local"
    }

    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn input_len(&self) -> usize {
        self.model.input_len()
    }

    async fn classify(&self, spectrum: &Spectrum) -> Result<ClassificationResult, ClassifierError> {
        let expected = self.model.input_len();
        if spectrum.len() != expected {
            return Err(ClassifierError::InputLength {
                expected,
                actual: spectrum.len(),
            });
        }
        let scores = self.model.predict(&spectrum.to_f32());
        ClassificationResult::from_scores(&self.labels, &scores)
    }
}
