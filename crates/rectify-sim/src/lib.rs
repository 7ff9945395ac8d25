//! # rectify-sim - Sensor Simulation with Ground Truth
//!
//! Generates environmental sensor readings with controlled fault injection
//! and scores a [`rectify_core::SensorEngine`] against the injected faults.
//!
//! ```rust,no_run
//! use rectify_core::{EngineConfig, SensorEngine};
//! use rectify_sim::{Fault, FaultKind, SensorSimulator, bench};
//!
//! let samples = SensorSimulator::new(42)
//!     .with_faults([Fault::new(FaultKind::Spike, "temperature", 100, 3)])
//!     .samples(500);
//!
//! let mut engine = SensorEngine::new(EngineConfig::default()).unwrap();
//! let report = bench::replay(&mut engine, &samples);
//! println!("F1 = {:.3}", report.overall().f1());
//! ```

pub mod bench;
pub mod faults;
pub mod generator;

pub use bench::{BenchReport, Confusion, MetricScore, replay};
pub use faults::{Fault, FaultKind, FaultParseError, Label};
pub use generator::{Sample, SensorSimulator, SimulatorConfig};
