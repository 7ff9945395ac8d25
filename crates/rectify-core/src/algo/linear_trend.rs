use super::stats::{linear_fit, mean_std};
use super::{Expert, ExpertContext};
use crate::signal::{ExpertId, Verdict};

/// Least-squares trend over the window, extrapolated one step ahead.
///
/// The tolerance band scales with the window's dispersion but never drops
/// below `min_threshold` absolute units, so near-constant series do not
/// alarm on sensor jitter.
#[derive(Debug, Clone)]
pub struct LinearTrendExpert {
    pub min_history: usize,
    pub sigma_multiplier: f64,
    pub min_threshold: f64,
}

impl Default for LinearTrendExpert {
    fn default() -> Self {
        Self {
            min_history: 5,
            sigma_multiplier: 2.5,
            min_threshold: 1.5,
        }
    }
}

impl LinearTrendExpert {
    /// Extrapolate the fitted line to index `n`.
    pub fn predict_next(&self, ctx: &ExpertContext) -> Option<f64> {
        let (slope, intercept) = linear_fit(ctx.history)?;
        Some(slope * ctx.history.len() as f64 + intercept)
    }
}

impl Expert for LinearTrendExpert {
    fn id(&self) -> ExpertId {
        ExpertId::LinearTrend
    }

    fn evaluate(&self, ctx: &ExpertContext) -> Verdict {
        if ctx.history.len() < self.min_history {
            return Verdict::neutral(ctx.value);
        }

        let Some(predicted) = self.predict_next(ctx) else {
            return Verdict::neutral(ctx.value);
        };

        let (_, std) = mean_std(ctx.history);
        let threshold = (std * self.sigma_multiplier).max(self.min_threshold);

        Verdict::new((ctx.value - predicted).abs() > threshold, predicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Window;
    use crate::metric::Bounds;

    fn eval(history: &[f64], value: f64) -> Verdict {
        let window = Window::from_values(20, history);
        LinearTrendExpert::default().evaluate(&ExpertContext {
            value,
            history: &window,
            bounds: Bounds::new(10.0, 40.0),
        })
    }

    #[test]
    fn test_insufficient_history_is_neutral() {
        assert_eq!(eval(&[20.0, 21.0], 80.0), Verdict::neutral(80.0));
    }

    #[test]
    fn test_follows_ramp() {
        let ramp = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let v = eval(&ramp, 16.0);
        assert!(!v.is_anomaly);
        assert!((v.prediction - 16.0).abs() < 1e-9);

        // threshold = max(2.5 * 1.7078, 1.5) ~ 4.27
        assert!(eval(&ramp, 21.0).is_anomaly);
        assert!(!eval(&ramp, 19.5).is_anomaly);
    }

    #[test]
    fn test_floor_threshold_on_flat_series() {
        let flat = [25.0; 8];
        assert!(!eval(&flat, 26.5).is_anomaly);
        assert!(eval(&flat, 26.6).is_anomaly);
        assert_eq!(eval(&flat, 26.6).prediction, 25.0);
    }

    #[test]
    fn test_known_fixture_prediction() {
        // x = 0..5, y = [20, 21, 19, 20, 22]: slope 0.3, intercept 19.8
        let v = eval(&[20.0, 21.0, 19.0, 20.0, 22.0], 45.0);
        assert!(v.is_anomaly);
        assert!((v.prediction - 21.3).abs() < 1e-9);
    }
}
