//! Configuration for the Motion Spectrum Agent.

use crate::classifier::LabelSet;
use crate::core::{
    spectrum_len, FilterPolicy, ReadinessPolicy, SpectralFilter, DEFAULT_HIGH_CUT_HZ,
    DEFAULT_LOW_CUT_HZ,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
///
/// `target_window_size` fixes the spectrum length (`target_window_size / 2 + 1`)
/// and must match the input size of whatever model is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Nominal sensor sampling rate in Hz
    pub sample_rate_hz: f64,

    /// Duration covered by one window; the buffer keeps twice this
    #[serde(with = "duration_serde")]
    pub window_duration: Duration,

    /// Number of samples per window
    pub target_window_size: usize,

    /// Period of the window-extraction tick
    #[serde(with = "duration_serde")]
    pub tick_period: Duration,

    /// What to do when a tick finds fewer samples than a full window
    pub readiness: ReadinessPolicy,

    /// Band-pass filter settings
    pub filter: FilterConfig,

    /// Classification backend
    pub classifier: ClassifierConfig,

    /// Class labels in model output order
    pub labels: LabelSet,

    /// Path for statistics and other state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-spectrum-agent");

        Self {
            sample_rate_hz: 50.0,
            window_duration: Duration::from_secs(5),
            target_window_size: 250,
            tick_period: Duration::from_millis(2_500),
            readiness: ReadinessPolicy::Strict,
            filter: FilterConfig::default(),
            classifier: ClassifierConfig::default(),
            labels: LabelSet::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motion-spectrum-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Spectrum length produced by full windows.
    pub fn spectrum_len(&self) -> usize {
        spectrum_len(self.target_window_size)
    }

    /// Upper bound on one classification call.
    ///
    /// Remote calls use the endpoint timeout; local calls may not outlive a tick.
    pub fn classification_timeout(&self) -> Duration {
        match self.classifier {
            ClassifierConfig::Remote(ref remote) => remote.timeout,
            ClassifierConfig::Local { .. } => self.tick_period,
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz > 0.0 && self.sample_rate_hz.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate_hz must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        if self.target_window_size == 0 {
            return Err(ConfigError::Invalid("target_window_size must be non-zero".to_string()));
        }
        if self.window_duration.is_zero() {
            return Err(ConfigError::Invalid("window_duration must be non-zero".to_string()));
        }
        let retention_fits = i64::try_from(self.window_duration.as_millis())
            .ok()
            .and_then(|ms| ms.checked_mul(2))
            .is_some();
        if !retention_fits {
            return Err(ConfigError::Invalid(format!(
                "window_duration {:?} is too large to retain twice over",
                self.window_duration
            )));
        }
        if self.tick_period.is_zero() {
            return Err(ConfigError::Invalid("tick_period must be non-zero".to_string()));
        }
        if self.labels.is_empty() {
            return Err(ConfigError::Invalid("labels must not be empty".to_string()));
        }
        self.filter.build()?;

        // A window must fit inside the retained history.
        let retained = 2.0 * self.window_duration.as_secs_f64() * self.sample_rate_hz;
        if (self.target_window_size as f64) > retained {
            return Err(ConfigError::Invalid(format!(
                "target_window_size {} exceeds the {} samples retained at {} Hz",
                self.target_window_size, retained as usize, self.sample_rate_hz
            )));
        }

        if let ClassifierConfig::Remote(ref remote) = self.classifier {
            if remote.timeout.is_zero() {
                return Err(ConfigError::Invalid("remote timeout must be non-zero".to_string()));
            }
        }
        Ok(())
    }
}

/// Band-pass filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub policy: FilterPolicy,
    pub low_cut_hz: f64,
    pub high_cut_hz: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            policy: FilterPolicy::Masking,
            low_cut_hz: DEFAULT_LOW_CUT_HZ,
            high_cut_hz: DEFAULT_HIGH_CUT_HZ,
        }
    }
}

impl FilterConfig {
    /// Build the filter these settings describe.
    pub fn build(&self) -> Result<SpectralFilter, ConfigError> {
        SpectralFilter::new(self.policy, self.low_cut_hz, self.high_cut_hz)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Which classification backend to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// In-process linear model loaded from JSON
    Local { model_path: PathBuf },
    /// Remote inference endpoint
    Remote(RemoteConfig),
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::Remote(RemoteConfig::default())
    }
}

/// Remote endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL, e.g. `http://127.0.0.1:8000`
    pub url: String,
    /// Hard limit on one request, connection included
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    /// Prediction endpoint URL.
    pub fn predict_url(&self) -> String {
        format!("{}/predict", self.url.trim_end_matches('/'))
    }

    /// Liveness endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/", self.url.trim_end_matches('/'))
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8000", Duration::from_secs(2))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as integer milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
