//! Error types surfaced by the engine and its configuration layer.

use std::path::PathBuf;

use thiserror::Error;

/// A configured metric carried a value that is not a finite number.
///
/// This is a contract violation by the caller, not a statistical anomaly:
/// the reading is rejected as a whole and no history is touched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid reading for metric `{metric}`: {raw}")]
pub struct InvalidReadingError {
    /// Metric name the value was supplied for
    pub metric: String,
    /// The raw value as it appeared in the reading
    pub raw: String,
}

impl InvalidReadingError {
    pub fn new(metric: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            raw: raw.into(),
        }
    }
}

/// Misconfiguration detected at construction or load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("window size must be a positive integer, got {0}")]
    InvalidWindowSize(usize),

    #[error("invalid bounds for metric `{metric}`: min {min} must be finite and below max {max}")]
    InvalidBounds { metric: String, min: f64, max: f64 },

    #[error("at least one metric must be configured")]
    EmptyMetricSet,

    #[error("metric `{0}` is configured more than once")]
    DuplicateMetric(String),

    #[error("metric names must not be empty")]
    EmptyMetricName,

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
