//! Detector experts
//!
//! Each expert is a pure function of the value under test, the metric's
//! window as it stood before this reading, and the metric's bounds.

pub mod forest;
pub mod linear_trend;
pub mod moving_average;
pub mod stats;

pub use forest::ForestExpert;
pub use linear_trend::LinearTrendExpert;
pub use moving_average::MovingAverageExpert;

use crate::history::Window;
use crate::metric::Bounds;
use crate::signal::{ExpertId, Verdict};

/// Context passed to every expert for every metric value
#[derive(Debug, Clone, Copy)]
pub struct ExpertContext<'a> {
    pub value: f64,
    /// Pre-update window; never contains `value`
    pub history: &'a Window,
    pub bounds: Bounds,
}

/// The interface every expert implements
pub trait Expert: Send + Sync {
    fn id(&self) -> ExpertId;

    fn evaluate(&self, ctx: &ExpertContext) -> Verdict;
}
