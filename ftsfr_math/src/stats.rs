//! Descriptive statistics
//!
//! All functions skip non-finite inputs, so callers can pass series with
//! NaN placeholders for missing observations. Functions return `None` when
//! the statistic is undefined for the remaining values.

/// Iterator over the finite values of a slice
fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| v.is_finite())
}

/// Number of finite values
pub fn count_finite(values: &[f64]) -> usize {
    finite(values).count()
}

/// Arithmetic mean of the finite values
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, n) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Variance of the finite values with `ddof` delta degrees of freedom
pub fn variance(values: &[f64], ddof: usize) -> Option<f64> {
    let n = count_finite(values);
    if n <= ddof {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = finite(values).map(|v| (v - m).powi(2)).sum();
    Some(ss / (n - ddof) as f64)
}

/// Standard deviation of the finite values with `ddof` delta degrees of freedom
pub fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    variance(values, ddof).map(f64::sqrt)
}

/// Linear-interpolated quantile of the finite values, `q` in [0, 1]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = finite(values).collect();
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Median of the finite values
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Median absolute deviation around the median
pub fn median_abs_deviation(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let deviations: Vec<f64> = finite(values).map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Sample autocorrelation at `lag`, computed over the full sample variance
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag >= n {
        return 0.0;
    }
    let m = match mean(values) {
        Some(m) => m,
        None => return 0.0,
    };
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let num: f64 = (lag..n)
        .map(|i| (values[i] - m) * (values[i - lag] - m))
        .sum();
    num / denom
}

/// Autocorrelations for lags `0..=max_lag`
pub fn acf(values: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag).map(|lag| autocorrelation(values, lag)).collect()
}

/// Mean absolute difference between each value and the one `lag` steps
/// earlier, over pairs where both are finite
pub fn lagged_mae(values: &[f64], lag: usize) -> Option<f64> {
    if lag == 0 || values.len() <= lag {
        return None;
    }
    let (sum, n) = (lag..values.len())
        .map(|i| (values[i], values[i - lag]))
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .fold((0.0, 0usize), |(s, n), (a, b)| (s + (a - b).abs(), n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_skips_missing_values() {
        let values = [1.0, f64::NAN, 3.0, f64::INFINITY];
        assert_relative_eq!(mean(&values).unwrap(), 2.0);
        assert_eq!(mean(&[f64::NAN]), None);
    }

    #[test]
    fn sample_std_uses_ddof() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(std_dev(&values, 0).unwrap(), 2.0);
        assert_relative_eq!(std_dev(&values, 1).unwrap(), 2.138089935, epsilon = 1e-8);
        assert_eq!(std_dev(&[1.0], 1), None);
    }

    #[test]
    fn quantiles_interpolate() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(median(&values).unwrap(), 2.5);
        assert_relative_eq!(quantile(&values, 0.0).unwrap(), 1.0);
        assert_relative_eq!(quantile(&values, 1.0).unwrap(), 4.0);
        assert_eq!(quantile(&values, 1.5), None);
    }

    #[test]
    fn lagged_mae_is_seasonal_naive_error() {
        let values = [1.0, 2.0, 4.0, 7.0];
        assert_relative_eq!(lagged_mae(&values, 1).unwrap(), 2.0);
        assert_relative_eq!(lagged_mae(&values, 2).unwrap(), 4.0);
        assert_eq!(lagged_mae(&values, 4), None);
    }

    #[test]
    fn autocorrelation_of_alternating_series_is_negative() {
        let values: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!(autocorrelation(&values, 1) < -0.9);
        assert!(autocorrelation(&values, 2) > 0.9);
    }
}
