//! Window statistics shared by the experts.

use crate::history::Window;

/// Mean and population standard deviation. `(0.0, 0.0)` for an empty window.
pub fn mean_std(window: &Window) -> (f64, f64) {
    let n = window.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = window.iter().sum::<f64>() / n as f64;
    let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, variance.sqrt())
}

/// Lower median: element at `len / 2` of the ascending sort.
pub fn lower_median(window: &Window) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let mut sorted = window.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Ordinary least squares over `(i, y_i)` with `i = 0..n`.
/// Returns `(slope, intercept)`, or `None` when the design is degenerate.
pub fn linear_fit(window: &Window) -> Option<(f64, f64)> {
    let n = window.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx) = (0.0, 0.0, 0.0, 0.0);
    for (i, y) in window.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return None;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n;
    Some((slope, intercept))
}
