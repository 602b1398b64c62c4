//! Goodness-of-fit metrics and small series helpers for calibration.
//!
//! All metrics take simulated and observed slices (co-indexed) and return
//! a scalar score.

/// R2, or Nash-Sutcliffe efficiency as it is called in hydrology.
///
/// 1.0 is perfect, 0.0 equals always predicting the observed mean, can be
/// negative. Returns `NEG_INFINITY` when the observed series is constant.
pub fn r2(simulated: &[f64], observed: &[f64], observed_mean: f64) -> f64 {
    let denominator = squared_error_about(observed, observed_mean);
    if denominator == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - squared_error(simulated, observed) / denominator
}

/// Normalized absolute error: the R2 ratio with absolute differences in
/// place of squares. 1.0 is perfect, 0.0 equals the mean prediction.
/// Returns `NEG_INFINITY` when the observed series is constant.
pub fn normalized_absolute_error(simulated: &[f64], observed: &[f64], observed_mean: f64) -> f64 {
    let denominator = absolute_error_about(observed, observed_mean);
    if denominator == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - absolute_error(simulated, observed) / denominator
}

/// Sum of squared differences between two series.
pub fn squared_error(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Sum of squared differences between a series and a scalar.
pub fn squared_error_about(a: &[f64], v: f64) -> f64 {
    a.iter().map(|x| (x - v).powi(2)).sum()
}

/// Sum of absolute differences between two series.
pub fn absolute_error(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Sum of absolute differences between a series and a scalar.
pub fn absolute_error_about(a: &[f64], v: f64) -> f64 {
    a.iter().map(|x| (x - v).abs()).sum()
}

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample standard deviation (n-1 denominator); 0.0 for fewer than two values.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Running cumulative sum.
pub fn cumsum(xs: &[f64]) -> Vec<f64> {
    let mut acc = 0.0;
    xs.iter()
        .map(|x| {
            acc += x;
            acc
        })
        .collect()
}
