//! Remote inference endpoint client.
//!
//! The endpoint accepts `POST /predict` with `{"data": [...]}` and answers
//! `{"predicted_index": i, "probabilities": [...]}`, optionally with the
//! server's own `predicted_class` and `names`.

use crate::classifier::{ClassificationResult, Classifier, ClassifierError, LabelSet};
use crate::config::RemoteConfig;
use crate::core::Spectrum;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    data: &'a [f64],
}

/// Response body of the prediction endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    pub predicted_index: usize,
    pub probabilities: Vec<f32>,
    #[serde(default)]
    pub predicted_class: Option<String>,
    /// Server-side index to label mapping
    #[serde(default)]
    pub names: Option<serde_json::Value>,
}

/// Classifier that delegates to a remote inference service.
pub struct RemoteClassifier {
    config: RemoteConfig,
    client: reqwest::Client,
    labels: LabelSet,
    input_len: usize,
}

impl RemoteClassifier {
    pub fn new(config: RemoteConfig, labels: LabelSet, input_len: usize) -> Result<Self, ClassifierError> {
        if config.timeout.is_zero() {
            return Err(ClassifierError::Setup("remote timeout must be non-zero".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Setup(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            labels,
            input_len,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Check that the endpoint answers at all.
    pub async fn test_connection(&self) -> Result<bool, ClassifierError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(response.status().is_success())
    }

    fn transport_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout(self.config.timeout)
        } else if e.is_decode() {
            ClassifierError::MalformedResponse(e.to_string())
        } else {
            ClassifierError::Connection(e.to_string())
        }
    }

    fn normalize(&self, response: PredictResponse) -> Result<ClassificationResult, ClassifierError> {
        let result = ClassificationResult::from_scores(&self.labels, &response.probabilities)?;

        if response.predicted_index != result.predicted_index {
            tracing::warn!(
                server_index = response.predicted_index,
                argmax = result.predicted_index,
                "Server prediction disagrees with its probabilities, using argmax"
            );
        }
        if let Some(ref class) = response.predicted_class {
            if *class != result.predicted_label {
                tracing::debug!(
                    server_class = %class,
                    label = %result.predicted_label,
                    "Server label differs from configured label set"
                );
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    fn name(&self) -> &str {
        "remote"
    }

    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn input_len(&self) -> usize {
        self.input_len
    }

    async fn classify(&self, spectrum: &Spectrum) -> Result<ClassificationResult, ClassifierError> {
        if spectrum.len() != self.input_len {
            return Err(ClassifierError::InputLength {
                expected: self.input_len,
                actual: spectrum.len(),
            });
        }

        let response = self
            .client
            .post(self.config.predict_url())
            .json(&PredictRequest {
                data: &spectrum.values,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: PredictResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

        self.normalize(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn classifier() -> RemoteClassifier {
        let labels = LabelSet::new(["a", "b", "c", "d"]).unwrap();
        RemoteClassifier::new(RemoteConfig::default(), labels, 126).unwrap()
    }

    #[test]
    fn test_remote_config_urls() {
        let config = RemoteConfig::new("http://10.0.0.5:8000/", Duration::from_secs(1));
        assert_eq!(config.predict_url(), "http://10.0.0.5:8000/predict");
        assert_eq!(config.health_url(), "http://10.0.0.5:8000/");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RemoteConfig::new("http://127.0.0.1:1", Duration::ZERO);
        assert!(RemoteClassifier::new(config, LabelSet::default(), 126).is_err());
    }

    #[test]
    fn test_normalize_full_response() {
        let body = r#"{
            "predicted_index": 1,
            "predicted_class": "b",
            "probabilities": [0.1, 0.7, 0.7, 0.1],
            "names": {"0": "a", "1": "b", "2": "c", "3": "d"}
        }"#;
        let parsed: PredictResponse = serde_json::from_str(body).unwrap();
        let result = classifier().normalize(parsed).unwrap();
        assert_eq!(result.predicted_label, "b");
    }

    #[test]
    fn test_normalize_prefers_argmax_over_server_index() {
        let parsed: PredictResponse =
            serde_json::from_str(r#"{"predicted_index": 0, "probabilities": [0.1, 0.2, 0.6, 0.1]}"#)
                .unwrap();
        let result = classifier().normalize(parsed).unwrap();
        assert_eq!(result.predicted_label, "c");
    }

    #[test]
    fn test_normalize_rejects_label_mismatch() {
        let parsed: PredictResponse =
            serde_json::from_str(r#"{"predicted_index": 0, "probabilities": [0.9, 0.1]}"#).unwrap();
        let err = classifier().normalize(parsed).unwrap_err();
        assert!(matches!(err, ClassifierError::MalformedResponse(_)));
    }

    #[test]
    fn test_request_payload_shape() {
        let values = [1.0, 2.5];
        let json = serde_json::to_value(PredictRequest { data: &values }).unwrap();
        assert_eq!(json, serde_json::json!({"data": [1.0, 2.5]}));
    }
}
