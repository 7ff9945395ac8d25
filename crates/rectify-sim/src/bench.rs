//! Score an engine against labelled samples.

use std::collections::BTreeMap;

use rectify_core::SensorEngine;
use serde::Serialize;
use tracing::debug;

use crate::faults::Label;
use crate::generator::Sample;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confusion {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

impl Confusion {
    pub fn record(&mut self, expected: bool, flagged: bool) {
        match (expected, flagged) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (true, false) => self.false_negatives += 1,
            (false, false) => self.true_negatives += 1,
        }
    }

    pub fn merge(&mut self, other: &Confusion) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.true_negatives += other.true_negatives;
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.false_negatives + self.true_negatives
    }

    /// 1.0 when nothing was flagged
    pub fn precision(&self) -> f64 {
        let flagged = self.true_positives + self.false_positives;
        if flagged == 0 {
            return 1.0;
        }
        self.true_positives as f64 / flagged as f64
    }

    /// 1.0 when nothing should have been flagged
    pub fn recall(&self) -> f64 {
        let expected = self.true_positives + self.false_negatives;
        if expected == 0 {
            return 1.0;
        }
        self.true_positives as f64 / expected as f64
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricScore {
    pub confusion: Confusion,
    /// Values the engine replaced
    pub rectified: u64,
    /// Sum of |corrected - clean| over replaced values
    pub abs_error_sum: f64,
}

impl MetricScore {
    pub fn mean_abs_error(&self) -> Option<f64> {
        (self.rectified > 0).then(|| self.abs_error_sum / self.rectified as f64)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BenchReport {
    pub samples: u64,
    /// Readings the engine refused
    pub rejected: u64,
    /// Refused readings that carried a garbled value
    pub expected_rejections: u64,
    pub metrics: BTreeMap<String, MetricScore>,
}

impl BenchReport {
    pub fn overall(&self) -> Confusion {
        let mut total = Confusion::default();
        for score in self.metrics.values() {
            total.merge(&score.confusion);
        }
        total
    }

    /// Refusals of readings that had nothing wrong with them
    pub fn unexpected_rejections(&self) -> u64 {
        self.rejected - self.expected_rejections
    }
}

/// Feed `samples` through `engine` in order and score every decision.
pub fn replay(engine: &mut SensorEngine, samples: &[Sample]) -> BenchReport {
    let mut report = BenchReport::default();

    for sample in samples {
        report.samples += 1;

        let outcome = match engine.process_point(&sample.reading) {
            Ok(outcome) => outcome,
            Err(err) => {
                report.rejected += 1;
                if sample.is_invalid() {
                    report.expected_rejections += 1;
                }
                debug!(index = sample.index, error = %err, "sample rejected");
                continue;
            }
        };

        for rep in &outcome.reports {
            let score = report.metrics.entry(rep.metric.clone()).or_default();
            let expected = sample.label(&rep.metric) == Label::Anomalous;
            score.confusion.record(expected, rep.decision.is_anomaly);

            if rep.decision.is_anomaly {
                if let Some(clean) = sample.clean.get(&rep.metric) {
                    score.rectified += 1;
                    score.abs_error_sum += (rep.decision.corrected - clean).abs();
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::{Fault, FaultKind};
    use crate::generator::SensorSimulator;
    use rectify_core::EngineConfig;

    fn engine() -> SensorEngine {
        SensorEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_confusion_scores() {
        let mut c = Confusion::default();
        c.record(true, true);
        c.record(true, true);
        c.record(true, false);
        c.record(false, true);
        c.record(false, false);

        assert_eq!(c.total(), 5);
        assert!((c.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((c.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((c.f1() - 2.0 / 3.0).abs() < 1e-12);

        let empty = Confusion::default();
        assert_eq!(empty.precision(), 1.0);
        assert_eq!(empty.recall(), 1.0);
    }

    #[test]
    fn test_spikes_are_caught_and_repaired() {
        let samples = SensorSimulator::new(11)
            .with_faults([Fault::new(FaultKind::Spike, "temperature", 100, 3)])
            .samples(150);

        let report = replay(&mut engine(), &samples);
        let temperature = &report.metrics["temperature"];

        assert_eq!(report.samples, 150);
        assert_eq!(report.rejected, 0);
        assert_eq!(temperature.confusion.true_positives, 3);
        assert_eq!(temperature.confusion.false_negatives, 0);
        // Repaired values land near the clean signal, far from the +15 spike
        assert!(temperature.mean_abs_error().unwrap() < 5.0);
    }

    #[test]
    fn test_dropouts_are_rejected() {
        let samples = SensorSimulator::new(2)
            .with_faults([Fault::new(FaultKind::Dropout, "light", 40, 4)])
            .samples(60);

        let report = replay(&mut engine(), &samples);
        assert_eq!(report.rejected, 4);
        assert_eq!(report.expected_rejections, 4);
        assert_eq!(report.unexpected_rejections(), 0);
        // Rejected samples are not scored
        assert_eq!(report.metrics["light"].confusion.total(), 56);
    }
}
