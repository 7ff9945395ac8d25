use super::stats::mean_std;
use super::{Expert, ExpertContext};
use crate::signal::{ExpertId, Verdict};

/// Z-score against the window mean.
///
/// A flat window (`σ = 0`) yields `z = 0`, so constant series never trip
/// this expert. Prediction is always the window mean.
#[derive(Debug, Clone)]
pub struct MovingAverageExpert {
    pub min_history: usize,
    pub z_threshold: f64,
}

impl Default for MovingAverageExpert {
    fn default() -> Self {
        Self {
            min_history: 5,
            z_threshold: 2.5,
        }
    }
}

impl Expert for MovingAverageExpert {
    fn id(&self) -> ExpertId {
        ExpertId::MovingAverage
    }

    fn evaluate(&self, ctx: &ExpertContext) -> Verdict {
        if ctx.history.len() < self.min_history {
            return Verdict::neutral(ctx.value);
        }

        let (mean, std) = mean_std(ctx.history);
        let z_score = if std > 0.0 {
            (ctx.value - mean).abs() / std
        } else {
            0.0
        };

        Verdict::new(z_score > self.z_threshold, mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Window;
    use crate::metric::Bounds;

    fn eval(history: &[f64], value: f64) -> Verdict {
        let window = Window::from_values(20, history);
        MovingAverageExpert::default().evaluate(&ExpertContext {
            value,
            history: &window,
            bounds: Bounds::new(10.0, 40.0),
        })
    }

    #[test]
    fn test_insufficient_history_is_neutral() {
        assert_eq!(eval(&[20.0, 21.0, 19.0, 20.0], 99.0), Verdict::neutral(99.0));
        assert_eq!(eval(&[], 5.0), Verdict::neutral(5.0));
    }

    #[test]
    fn test_outlier_flagged_and_mean_predicted() {
        let v = eval(&[20.0, 21.0, 19.0, 20.0, 22.0], 45.0);
        assert!(v.is_anomaly);
        assert!((v.prediction - 20.4).abs() < 1e-12);
    }

    #[test]
    fn test_flat_history_never_fires() {
        let v = eval(&[25.0; 10], 1000.0);
        assert!(!v.is_anomaly);
        assert_eq!(v.prediction, 25.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        // mean 2, std 1 -> value 4.5 sits exactly at z = 2.5
        let v = eval(&[1.0, 3.0, 1.0, 3.0, 1.0, 3.0], 4.5);
        assert!(!v.is_anomaly);
        let v = eval(&[1.0, 3.0, 1.0, 3.0, 1.0, 3.0], 4.51);
        assert!(v.is_anomaly);
    }
}
