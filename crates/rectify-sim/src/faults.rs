//! Fault injection with ground truth
//!
//! A [`Fault`] corrupts one metric for a run of consecutive samples. Every
//! corrupted sample is labelled so a replay can score the engine.

use std::fmt;
use std::str::FromStr;

use rectify_core::metric::Bounds;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Additive jump of half the metric's range
    Spike,
    /// Value a quarter range beyond the upper bound
    OutOfRange,
    /// Non-numeric payload, alternating `"nan"` and `"ERR"`
    Dropout,
    /// Offset growing by 2% of the range per sample
    Drift,
}

impl FaultKind {
    pub const ALL: [FaultKind; 4] = [
        FaultKind::Spike,
        FaultKind::OutOfRange,
        FaultKind::Dropout,
        FaultKind::Drift,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::Spike => "spike",
            FaultKind::OutOfRange => "out_of_range",
            FaultKind::Dropout => "dropout",
            FaultKind::Drift => "drift",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FaultKind::Spike => "Sudden jump of half the metric range",
            FaultKind::OutOfRange => "Physically impossible value",
            FaultKind::Dropout => "Garbled payload (\"nan\" / \"ERR\")",
            FaultKind::Drift => "Slow calibration drift",
        }
    }

    /// Label carried by samples this fault touches.
    pub fn label(&self) -> Label {
        match self {
            FaultKind::Dropout => Label::Invalid,
            _ => Label::Anomalous,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FaultKind {
    type Err = FaultParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spike" => Ok(FaultKind::Spike),
            "out_of_range" | "oor" => Ok(FaultKind::OutOfRange),
            "dropout" => Ok(FaultKind::Dropout),
            "drift" => Ok(FaultKind::Drift),
            other => Err(FaultParseError::UnknownKind(other.to_string())),
        }
    }
}

/// Ground truth for one metric of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    #[default]
    Clean,
    /// The engine should flag and rectify this value
    Anomalous,
    /// The engine should reject the whole reading
    Invalid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FaultParseError {
    #[error("expected kind:metric:start:duration, got `{0}`")]
    Format(String),
    #[error("unknown fault kind `{0}`")]
    UnknownKind(String),
    #[error("invalid number `{0}`")]
    Number(String),
    #[error("fault duration must be at least 1")]
    ZeroDuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub metric: String,
    /// First affected sample index
    pub start: usize,
    /// Number of affected samples
    pub duration: usize,
}

impl Fault {
    pub fn new(kind: FaultKind, metric: impl Into<String>, start: usize, duration: usize) -> Self {
        Self {
            kind,
            metric: metric.into(),
            start,
            duration,
        }
    }

    pub fn covers(&self, metric: &str, index: usize) -> bool {
        self.metric == metric && index >= self.start && index < self.start + self.duration
    }

    /// Corrupt the clean value of sample `index`.
    pub fn apply(&self, clean: f64, index: usize, bounds: Bounds) -> Value {
        let range = bounds.range();
        match self.kind {
            FaultKind::Spike => Value::from(clean + 0.5 * range),
            FaultKind::OutOfRange => Value::from(bounds.max + 0.25 * range),
            FaultKind::Dropout => {
                if index % 2 == 0 {
                    Value::from("nan")
                } else {
                    Value::from("ERR")
                }
            }
            FaultKind::Drift => {
                let steps = (index - self.start + 1) as f64;
                Value::from(clean + 0.02 * range * steps)
            }
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kind, self.metric, self.start, self.duration
        )
    }
}

/// Parses `kind:metric:start:duration`, e.g. `spike:temperature:100:3`.
impl FromStr for Fault {
    type Err = FaultParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let [kind, metric, start, duration] = parts.as_slice() else {
            return Err(FaultParseError::Format(s.to_string()));
        };
        if metric.is_empty() {
            return Err(FaultParseError::Format(s.to_string()));
        }

        let parse = |n: &str| {
            n.parse::<usize>()
                .map_err(|_| FaultParseError::Number(n.to_string()))
        };
        let duration = parse(*duration)?;
        if duration == 0 {
            return Err(FaultParseError::ZeroDuration);
        }

        Ok(Fault::new(kind.parse()?, *metric, parse(*start)?, duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fault() {
        let fault: Fault = "spike:temperature:100:3".parse().unwrap();
        assert_eq!(fault, Fault::new(FaultKind::Spike, "temperature", 100, 3));
        assert_eq!(fault.to_string(), "spike:temperature:100:3");

        assert_eq!(
            "oor:light:5:1".parse::<Fault>().unwrap().kind,
            FaultKind::OutOfRange
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "spike:temperature:100".parse::<Fault>(),
            Err(FaultParseError::Format(_))
        ));
        assert_eq!(
            "melt:temperature:1:1".parse::<Fault>(),
            Err(FaultParseError::UnknownKind("melt".into()))
        );
        assert_eq!(
            "spike:temperature:x:1".parse::<Fault>(),
            Err(FaultParseError::Number("x".into()))
        );
        assert_eq!(
            "spike:temperature:1:0".parse::<Fault>(),
            Err(FaultParseError::ZeroDuration)
        );
    }

    #[test]
    fn test_covers_window() {
        let fault = Fault::new(FaultKind::Drift, "humidity", 10, 3);
        assert!(!fault.covers("humidity", 9));
        assert!(fault.covers("humidity", 10));
        assert!(fault.covers("humidity", 12));
        assert!(!fault.covers("humidity", 13));
        assert!(!fault.covers("temperature", 11));
    }

    #[test]
    fn test_apply() {
        let bounds = Bounds::new(10.0, 40.0);
        let spike = Fault::new(FaultKind::Spike, "temperature", 0, 1);
        assert_eq!(spike.apply(25.0, 0, bounds), Value::from(40.0));

        let oor = Fault::new(FaultKind::OutOfRange, "temperature", 0, 1);
        assert_eq!(oor.apply(25.0, 0, bounds), Value::from(47.5));

        let dropout = Fault::new(FaultKind::Dropout, "temperature", 0, 2);
        assert_eq!(dropout.apply(25.0, 4, bounds), Value::from("nan"));
        assert_eq!(dropout.apply(25.0, 5, bounds), Value::from("ERR"));

        let drift = Fault::new(FaultKind::Drift, "temperature", 10, 5);
        let third = drift.apply(25.0, 12, bounds).as_f64().unwrap();
        assert!((third - 26.8).abs() < 1e-9);
    }
}
