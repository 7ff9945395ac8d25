//! Synthetic sensor readings
//!
//! Each metric follows a daily sinusoid around the middle of its bounds with
//! Gaussian noise on top. Scheduled faults corrupt individual values and
//! leave ground-truth labels behind.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rectify_core::Reading;
use rectify_core::metric::{MetricSpec, default_metrics};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::faults::{Fault, Label};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Samples per simulated day
    pub period: usize,
    /// Peak deviation from the midpoint, as a fraction of the range
    pub amplitude: f64,
    /// Noise standard deviation, as a fraction of the range
    pub noise: f64,
    /// Simulated time between samples
    pub interval_secs: i64,
    pub device: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            period: 96,
            amplitude: 0.15,
            noise: 0.005,
            interval_secs: 900,
            device: "sim-01".to_string(),
        }
    }
}

/// One generated reading with the signal behind it.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub index: usize,
    pub reading: Reading,
    /// Noisy value before any fault was applied
    pub clean: BTreeMap<String, f64>,
    pub labels: BTreeMap<String, Label>,
}

impl Sample {
    pub fn label(&self, metric: &str) -> Label {
        self.labels.get(metric).copied().unwrap_or_default()
    }

    pub fn is_invalid(&self) -> bool {
        self.labels.values().any(|l| *l == Label::Invalid)
    }

    pub fn is_faulted(&self) -> bool {
        self.labels.values().any(|l| *l != Label::Clean)
    }
}

pub struct SensorSimulator {
    rng: StdRng,
    config: SimulatorConfig,
    metrics: Vec<MetricSpec>,
    faults: Vec<Fault>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    index: usize,
}

impl SensorSimulator {
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, SimulatorConfig::default())
    }

    pub fn with_config(seed: u64, config: SimulatorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
            metrics: default_metrics(),
            faults: Vec::new(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            index: 0,
        }
    }

    pub fn with_faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.extend(faults);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    fn clean_value(&mut self, spec: &MetricSpec, index: usize) -> f64 {
        let range = spec.bounds.range();
        let midpoint = spec.bounds.min + range / 2.0;
        let phase = TAU * index as f64 / self.config.period.max(1) as f64;
        let noise: f64 = self.rng.sample(StandardNormal);

        midpoint + self.config.amplitude * range * phase.sin() + self.config.noise * range * noise
    }

    pub fn next_sample(&mut self) -> Sample {
        let index = self.index;
        self.index += 1;

        let ts = self.started_at + Duration::seconds(self.config.interval_secs * index as i64);
        let mut reading = Reading::new()
            .with("device", self.config.device.clone())
            .with("ts", ts.to_rfc3339())
            .with("run", self.run_id.simple().to_string());
        let mut clean = BTreeMap::new();
        let mut labels = BTreeMap::new();

        let metrics = self.metrics.clone();
        for spec in &metrics {
            let value = self.clean_value(spec, index);
            clean.insert(spec.name.clone(), value);

            let fault = self.faults.iter().find(|f| f.covers(&spec.name, index));
            let (payload, label) = match fault {
                Some(fault) => (fault.apply(value, index, spec.bounds), fault.kind.label()),
                None => (Value::from(value), Label::Clean),
            };
            reading.insert(spec.name.clone(), payload);
            labels.insert(spec.name.clone(), label);
        }

        Sample {
            index,
            reading,
            clean,
            labels,
        }
    }

    pub fn samples(&mut self, count: usize) -> Vec<Sample> {
        (0..count).map(|_| self.next_sample()).collect()
    }
}

impl Iterator for SensorSimulator {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        Some(self.next_sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::FaultKind;

    fn metric_values(samples: &[Sample]) -> Vec<Option<f64>> {
        samples
            .iter()
            .flat_map(|s| {
                ["temperature", "humidity", "light"]
                    .map(|m| s.reading.get(m).and_then(Value::as_f64))
            })
            .collect()
    }

    #[test]
    fn test_same_seed_same_signal() {
        let a = SensorSimulator::new(7).samples(50);
        let b = SensorSimulator::new(7).samples(50);
        let c = SensorSimulator::new(8).samples(50);

        assert_eq!(metric_values(&a), metric_values(&b));
        assert_ne!(metric_values(&a), metric_values(&c));
    }

    #[test]
    fn test_values_stay_inside_bounds() {
        let specs = default_metrics();
        for sample in SensorSimulator::new(1).samples(200) {
            for spec in &specs {
                let v = sample.reading.get(&spec.name).and_then(Value::as_f64).unwrap();
                assert!(spec.bounds.contains(v), "{} = {v}", spec.name);
            }
            assert!(!sample.is_faulted());
        }
    }

    #[test]
    fn test_faults_are_labelled() {
        let samples = SensorSimulator::new(3)
            .with_faults([
                Fault::new(FaultKind::Spike, "temperature", 10, 2),
                Fault::new(FaultKind::Dropout, "humidity", 20, 1),
            ])
            .samples(30);

        assert_eq!(samples[9].label("temperature"), Label::Clean);
        assert_eq!(samples[10].label("temperature"), Label::Anomalous);
        assert_eq!(samples[11].label("temperature"), Label::Anomalous);
        assert_eq!(samples[12].label("temperature"), Label::Clean);

        let spiked = samples[10].reading.get("temperature").and_then(Value::as_f64).unwrap();
        assert!((spiked - samples[10].clean["temperature"] - 15.0).abs() < 1e-9);

        assert!(samples[20].is_invalid());
        assert_eq!(samples[20].reading.get("humidity"), Some(&Value::from("nan")));
        assert_eq!(samples[20].label("temperature"), Label::Clean);
    }

    #[test]
    fn test_readings_carry_stream_metadata() {
        let mut sim = SensorSimulator::new(5);
        let run = sim.run_id().simple().to_string();
        let sample = sim.next_sample();

        assert_eq!(sample.reading.get("device"), Some(&Value::from("sim-01")));
        assert_eq!(sample.reading.get("run"), Some(&Value::from(run)));
        assert!(sample.reading.get("ts").and_then(Value::as_str).is_some());
    }
}
