//! Rectification Engine
//!
//! Two-stage pipeline per metric:
//! 1. Detection: the three experts judge the value against the window as it
//!    stood before this reading.
//! 2. Decision: majority vote; a flagged value is replaced by a blend of the
//!    trend and mean predictions, and the accepted value enters the window.
//!
//! `process_point` takes `&mut self`: one engine instance serves one sensor
//! stream, one reading at a time.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::algo::{Expert, ExpertContext, ForestExpert, LinearTrendExpert, MovingAverageExpert};
use crate::config::EngineConfig;
use crate::error::{ConfigError, InvalidReadingError};
use crate::history::{HistoryStore, Window};
use crate::metric::{Bounds, MetricSpec};
use crate::reading::Reading;
use crate::signal::{
    Decision, ExpertId, MAJORITY, MetricReport, NUM_EXPERTS, PointOutcome, Verdict, round2,
};

/// Weight of the trend prediction in a rectified value
pub const TREND_WEIGHT: f64 = 0.6;
/// Weight of the mean prediction in a rectified value
pub const MEAN_WEIGHT: f64 = 0.4;

/// Counters for one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricStats {
    pub evaluated: u64,
    pub anomalies: u64,
}

/// Engine-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub points_processed: u64,
    pub points_rejected: u64,
    pub metrics: BTreeMap<String, MetricStats>,
}

impl EngineStats {
    fn record(&mut self, metric: &str, is_anomaly: bool) {
        let entry = self.metrics.entry(metric.to_string()).or_default();
        entry.evaluated += 1;
        if is_anomaly {
            entry.anomalies += 1;
        }
    }

    pub fn total_anomalies(&self) -> u64 {
        self.metrics.values().map(|m| m.anomalies).sum()
    }
}

/// Count the experts that flagged the value.
pub fn count_votes(verdicts: &[Verdict; NUM_EXPERTS]) -> u8 {
    verdicts.iter().filter(|v| v.is_anomaly).count() as u8
}

/// Blend of the trend and mean predictions (unrounded).
pub fn rectify(moving_average: &Verdict, linear_trend: &Verdict) -> f64 {
    TREND_WEIGHT * linear_trend.prediction + MEAN_WEIGHT * moving_average.prediction
}

/// Fold three verdicts into a decision for `raw`.
pub fn decide(raw: f64, verdicts: &[Verdict; NUM_EXPERTS]) -> (u8, Decision) {
    let votes = count_votes(verdicts);
    if votes >= MAJORITY {
        let rectified = rectify(
            &verdicts[ExpertId::MovingAverage as usize],
            &verdicts[ExpertId::LinearTrend as usize],
        );
        (
            votes,
            Decision {
                is_anomaly: true,
                corrected: round2(rectified),
                accepted: rectified,
            },
        )
    } else {
        (
            votes,
            Decision {
                is_anomaly: false,
                corrected: raw,
                accepted: raw,
            },
        )
    }
}

pub struct SensorEngine {
    config: EngineConfig,
    history: HistoryStore,
    moving_average: MovingAverageExpert,
    linear_trend: LinearTrendExpert,
    forest: ForestExpert,
    stats: EngineStats,
}

impl SensorEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let history = HistoryStore::new(
            config.window_size,
            config.metrics.iter().map(|m| m.name.as_str()),
        );
        Self {
            config,
            history,
            moving_average: MovingAverageExpert::default(),
            linear_trend: LinearTrendExpert::default(),
            forest: ForestExpert::default(),
            stats: EngineStats::default(),
        }
    }

    /// A new engine with the same configuration and empty windows.
    pub fn fresh(&self) -> Self {
        Self::build(self.config.clone())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    pub fn metrics(&self) -> &[MetricSpec] {
        &self.config.metrics
    }

    pub fn is_configured(&self, metric: &str) -> bool {
        self.config.metrics.iter().any(|m| m.name == metric)
    }

    /// Current window of a configured metric
    pub fn history(&self, metric: &str) -> Option<&Window> {
        self.history.snapshot(metric)
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Forget every window and counter.
    pub fn reset(&mut self) {
        self.history.clear();
        self.stats = EngineStats::default();
    }

    /// Judge `value` against the current window without touching any state.
    /// `None` for metrics the engine is not configured with.
    pub fn evaluate(&self, metric: &str, value: f64) -> Option<MetricReport> {
        let bounds = self.config.bounds(metric)?;
        let window = self.history.snapshot(metric)?;
        Some(self.judge(metric, bounds, window, value))
    }

    fn judge(&self, metric: &str, bounds: Bounds, window: &Window, value: f64) -> MetricReport {
        let ctx = ExpertContext {
            value,
            history: window,
            bounds,
        };

        let verdicts = [
            self.moving_average.evaluate(&ctx),
            self.linear_trend.evaluate(&ctx),
            self.forest.evaluate(&ctx),
        ];
        let (votes, decision) = decide(value, &verdicts);

        MetricReport {
            metric: metric.to_string(),
            raw: value,
            verdicts,
            votes,
            decision,
        }
    }

    /// Process one reading: judge every configured metric present, rectify
    /// flagged values and advance the windows.
    ///
    /// The reading is validated up front, so a rejected reading leaves the
    /// engine untouched apart from the rejection counter.
    pub fn process_point(&mut self, reading: &Reading) -> Result<PointOutcome, InvalidReadingError> {
        let mut present = Vec::with_capacity(self.config.metrics.len());
        for (idx, spec) in self.config.metrics.iter().enumerate() {
            match reading.metric_value(&spec.name) {
                Ok(Some(value)) => present.push((idx, value)),
                Ok(None) => {}
                Err(err) => {
                    self.stats.points_rejected += 1;
                    debug!(metric = %err.metric, raw = %err.raw, "rejected reading");
                    return Err(err);
                }
            }
        }

        let mut outcome = PointOutcome::default();
        for (key, value) in reading.iter() {
            if !self.is_configured(key) {
                outcome.corrected.insert(key.clone(), value.clone());
            }
        }
        for spec in &self.config.metrics {
            outcome.anomalies.insert(spec.name.clone(), false);
        }

        for (idx, value) in present {
            let spec = &self.config.metrics[idx];
            let report = match self.history.snapshot(&spec.name) {
                Some(window) => self.judge(&spec.name, spec.bounds, window, value),
                None => continue,
            };
            let decision = report.decision;

            self.history.append(&spec.name, decision.accepted);
            self.stats.record(&spec.name, decision.is_anomaly);

            if decision.is_anomaly {
                debug!(
                    metric = %spec.name,
                    raw = value,
                    corrected = decision.corrected,
                    votes = report.votes,
                    "rectified value"
                );
            }

            outcome
                .corrected
                .insert(spec.name.clone(), Value::from(decision.corrected));
            outcome
                .anomalies
                .insert(spec.name.clone(), decision.is_anomaly);
            outcome.reports.push(report);
        }

        self.stats.points_processed += 1;
        Ok(outcome)
    }
}

impl Default for SensorEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}
