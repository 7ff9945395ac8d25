//! Streaming anomaly detection and rectification for environmental sensors.
//!
//! A [`SensorEngine`] keeps a sliding window per metric, asks three experts
//! whether each new value fits, and replaces values the majority rejects
//! with a blend of the trend and mean forecasts.

pub mod algo;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod metric;
pub mod reading;
pub mod registry;
pub mod server;
pub mod signal;

pub use config::EngineConfig;
pub use engine::{EngineStats, SensorEngine};
pub use error::{ConfigError, InvalidReadingError};
pub use metric::{Bounds, MetricSpec};
pub use reading::Reading;
pub use registry::StreamRegistry;
pub use signal::{ExpertId, MetricReport, PointOutcome, Verdict};
