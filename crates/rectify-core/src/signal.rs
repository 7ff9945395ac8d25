//! Verdicts, decisions and per-point output
//!
//! Every expert produces a `Verdict`; the aggregator folds the three verdicts
//! of a metric into a `Decision`. A `MetricReport` keeps the full breakdown
//! for diagnostics, and `PointOutcome` is what callers get back per reading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of experts in the ensemble (compile-time constant)
pub const NUM_EXPERTS: usize = 3;

/// Minimum number of agreeing experts for an anomaly
pub const MAJORITY: u8 = 2;

/// Expert identifiers for attribution
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertId {
    MovingAverage = 0,
    LinearTrend = 1,
    Forest = 2,
}

impl ExpertId {
    pub const ALL: [ExpertId; NUM_EXPERTS] =
        [Self::MovingAverage, Self::LinearTrend, Self::Forest];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MovingAverage => "MovingAverage/ZScore",
            Self::LinearTrend => "LinearTrend/Regression",
            Self::Forest => "Forest/Rules",
        }
    }
}

/// One expert's opinion on one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_anomaly: bool,
    /// What the expert thinks the value should be
    pub prediction: f64,
}

impl Verdict {
    pub fn new(is_anomaly: bool, prediction: f64) -> Self {
        Self {
            is_anomaly,
            prediction,
        }
    }

    /// No opinion: not anomalous, the value predicts itself
    pub fn neutral(value: f64) -> Self {
        Self::new(false, value)
    }
}

/// Aggregated outcome for one metric of one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub is_anomaly: bool,
    /// Externally visible value (rounded to 2 decimals when rectified)
    pub corrected: f64,
    /// Value that enters the history window (unrounded)
    pub accepted: f64,
}

/// Full breakdown of how a metric value was judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub metric: String,
    pub raw: f64,
    /// Verdicts indexed by `ExpertId as usize`
    pub verdicts: [Verdict; NUM_EXPERTS],
    pub votes: u8,
    pub decision: Decision,
}

impl MetricReport {
    pub fn verdict(&self, expert: ExpertId) -> Verdict {
        self.verdicts[expert as usize]
    }

    pub fn expert_fired(&self, expert: ExpertId) -> bool {
        self.verdict(expert).is_anomaly
    }

    /// Generate a compact reason string
    pub fn reason(&self) -> String {
        if !self.decision.is_anomaly {
            return String::from("Normal reading");
        }

        let fired: Vec<&str> = ExpertId::ALL
            .iter()
            .filter(|id| self.expert_fired(**id))
            .map(|id| id.name())
            .collect();

        format!(
            "{} rectified {:.2} -> {:.2} ({}/{} experts: {})",
            self.metric,
            self.raw,
            self.decision.corrected,
            self.votes,
            NUM_EXPERTS,
            fired.join(", ")
        )
    }
}

/// Engine output for one reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PointOutcome {
    /// Configured metrics present in the reading plus every unrecognised key, untouched
    pub corrected: Map<String, Value>,
    /// One flag per configured metric; `false` when absent or normal
    pub anomalies: BTreeMap<String, bool>,
    /// Per-metric breakdown, in processing order
    #[serde(skip)]
    pub reports: Vec<MetricReport>,
}

impl PointOutcome {
    pub fn any_anomaly(&self) -> bool {
        self.anomalies.values().any(|&flag| flag)
    }

    pub fn report(&self, metric: &str) -> Option<&MetricReport> {
        self.reports.iter().find(|r| r.metric == metric)
    }

    pub fn corrected_value(&self, metric: &str) -> Option<f64> {
        self.corrected.get(metric).and_then(Value::as_f64)
    }
}

/// Round to 2 decimal places for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
