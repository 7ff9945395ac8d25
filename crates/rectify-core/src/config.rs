//! Engine configuration.
//!
//! The engine is configured once at construction: a window size and the set
//! of metrics it analyses, each with its bound pair. Everything here is
//! serde-friendly so the gatekeeper can embed it in its TOML file.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::metric::{Bounds, MetricSpec, default_metrics};

pub const DEFAULT_WINDOW_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of accepted values kept per metric
    pub window_size: usize,
    /// Metrics analysed by the engine; anything else in a reading passes through
    pub metrics: Vec<MetricSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            metrics: default_metrics(),
        }
    }
}

impl EngineConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Override the bounds of a metric, adding it if it is not configured yet.
    pub fn with_bounds(mut self, name: &str, min: f64, max: f64) -> Self {
        match self.metrics.iter_mut().find(|m| m.name == name) {
            Some(spec) => spec.bounds = Bounds::new(min, max),
            None => self.metrics.push(MetricSpec::new(name, min, max)),
        }
        self
    }

    pub fn bounds(&self, name: &str) -> Option<Bounds> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.bounds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidWindowSize(self.window_size));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::EmptyMetricSet);
        }

        let mut seen = HashSet::with_capacity(self.metrics.len());
        for spec in &self.metrics {
            if spec.name.is_empty() {
                return Err(ConfigError::EmptyMetricName);
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateMetric(spec.name.clone()));
            }
            if !spec.bounds.is_valid() {
                return Err(ConfigError::InvalidBounds {
                    metric: spec.name.clone(),
                    min: spec.bounds.min,
                    max: spec.bounds.max,
                });
            }
        }
        Ok(())
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        info!(path = %path.display(), window_size = config.window_size, "loaded engine configuration");
        Ok(config)
    }
}

/// Read and deserialize a TOML document.
pub fn load_toml<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.window_size, 20);
        assert_eq!(config.metrics.len(), 3);
        assert_eq!(config.bounds("temperature"), Some(Bounds::new(10.0, 40.0)));
        assert_eq!(config.bounds("humidity"), Some(Bounds::new(20.0, 90.0)));
        assert_eq!(config.bounds("light"), Some(Bounds::new(0.0, 1024.0)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = EngineConfig::default().with_window_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindowSize(0))
        ));
    }

    #[test]
    fn test_with_bounds_overrides_and_adds() {
        let config = EngineConfig::default()
            .with_bounds("temperature", -20.0, 60.0)
            .with_bounds("pressure", 900.0, 1100.0);

        assert_eq!(config.bounds("temperature"), Some(Bounds::new(-20.0, 60.0)));
        assert_eq!(config.bounds("pressure"), Some(Bounds::new(900.0, 1100.0)));
        assert_eq!(config.metrics.len(), 4);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = EngineConfig::default().with_bounds("humidity", 90.0, 20.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_duplicate_metric_rejected() {
        let mut config = EngineConfig::default();
        config.metrics.push(MetricSpec::new("light", 0.0, 10.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateMetric(name)) if name == "light"
        ));
    }

    #[test]
    fn test_toml_round_trip_with_partial_fields() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            window_size = 10

            [[metrics]]
            name = "temperature"
            min = 0.0
            max = 50.0
            "#,
        )
        .unwrap();

        assert_eq!(parsed.window_size, 10);
        assert_eq!(parsed.metrics.len(), 1);
        assert_eq!(parsed.bounds("temperature"), Some(Bounds::new(0.0, 50.0)));

        let defaulted: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(defaulted, EngineConfig::default());
    }
}
