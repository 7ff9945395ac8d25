//! Metric channels and their physical bounds.

use serde::{Deserialize, Serialize};

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const LIGHT: &str = "light";

/// Physically plausible range of a metric, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the plausible range
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

/// A named sensor channel with its bound pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(flatten)]
    pub bounds: Bounds,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            bounds: Bounds::new(min, max),
        }
    }
}

/// Stock channels of the environmental sensor board.
pub fn default_metrics() -> Vec<MetricSpec> {
    vec![
        MetricSpec::new(TEMPERATURE, 10.0, 40.0),
        MetricSpec::new(HUMIDITY, 20.0, 90.0),
        // 10-bit ADC
        MetricSpec::new(LIGHT, 0.0, 1024.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_contains_edges() {
        let b = Bounds::new(10.0, 40.0);
        assert!(b.contains(10.0));
        assert!(b.contains(40.0));
        assert!(!b.contains(9.99));
        assert!(!b.contains(40.01));
        assert_eq!(b.range(), 30.0);
    }

    #[test]
    fn test_bounds_validity() {
        assert!(Bounds::new(0.0, 1024.0).is_valid());
        assert!(!Bounds::new(5.0, 5.0).is_valid());
        assert!(!Bounds::new(f64::NAN, 1.0).is_valid());
    }
}
