use serde::{Deserialize, Serialize};

use super::stats::lower_median;
use super::{Expert, ExpertContext};
use crate::signal::{ExpertId, Verdict};

/// Individual rule outcomes of the forest, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVotes {
    /// Value outside the physical bounds
    pub out_of_bounds: bool,
    /// Jump from the previous value larger than the velocity limit
    pub velocity_spike: bool,
    /// Distance from the window median larger than the context limit
    pub context_deviation: bool,
}

impl RuleVotes {
    pub fn count(&self) -> u8 {
        self.out_of_bounds as u8 + self.velocity_spike as u8 + self.context_deviation as u8
    }
}

/// Three cheap rules voting on different aspects of the signal.
///
/// Limits are fractions of the metric's bound range. Two agreeing rules
/// flag the value; the window median is the point estimate.
#[derive(Debug, Clone)]
pub struct ForestExpert {
    pub min_history: usize,
    pub velocity_fraction: f64,
    pub context_fraction: f64,
    pub min_votes: u8,
}

impl Default for ForestExpert {
    fn default() -> Self {
        Self {
            min_history: 2,
            velocity_fraction: 0.15,
            context_fraction: 0.20,
            min_votes: 2,
        }
    }
}

impl ForestExpert {
    /// Run the three rules. `None` while the window is too short to judge.
    pub fn rules(&self, ctx: &ExpertContext) -> Option<(RuleVotes, f64)> {
        if ctx.history.len() < self.min_history {
            return None;
        }
        let last = ctx.history.last()?;
        let median = lower_median(ctx.history)?;
        let range = ctx.bounds.range();

        let votes = RuleVotes {
            out_of_bounds: !ctx.bounds.contains(ctx.value),
            velocity_spike: (ctx.value - last).abs() > range * self.velocity_fraction,
            context_deviation: (ctx.value - median).abs() > range * self.context_fraction,
        };
        Some((votes, median))
    }
}

impl Expert for ForestExpert {
    fn id(&self) -> ExpertId {
        ExpertId::Forest
    }

    fn evaluate(&self, ctx: &ExpertContext) -> Verdict {
        match self.rules(ctx) {
            Some((votes, median)) => Verdict::new(votes.count() >= self.min_votes, median),
            None => Verdict::neutral(ctx.value),
        }
    }
}
