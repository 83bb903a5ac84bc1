//! Series transforms used by the model backends
//!
//! Differencing, gap filling and small polynomial helpers for lag operators.

use crate::{MathError, Result};

/// Apply a lag-`lag` difference `times` times
pub fn difference(values: &[f64], lag: usize, times: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..times {
        if out.len() <= lag {
            return Vec::new();
        }
        out = (lag..out.len()).map(|i| out[i] - out[i - lag]).collect();
    }
    out
}

/// Multiply two polynomials in the lag operator, coefficients ordered by power
pub fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Coefficients of `(1 - B)^d (1 - B^s)^D`, starting with the power-0 term
pub fn difference_operator(d: usize, seasonal_d: usize, period: usize) -> Vec<f64> {
    let mut op = vec![1.0];
    for _ in 0..d {
        op = poly_mul(&op, &[1.0, -1.0]);
    }
    if period > 1 {
        let mut seasonal = vec![0.0; period + 1];
        seasonal[0] = 1.0;
        seasonal[period] = -1.0;
        for _ in 0..seasonal_d {
            op = poly_mul(&op, &seasonal);
        }
    }
    op
}

/// Forward fill missing values; leading gaps are back-filled from the first
/// observed value
pub fn fill_missing(values: &[Option<f64>]) -> Result<Vec<f64>> {
    let first = values.iter().flatten().next().copied().ok_or_else(|| {
        MathError::InsufficientData("series has no observed values".to_string())
    })?;

    let mut last = first;
    Ok(values
        .iter()
        .map(|v| {
            if let Some(x) = v {
                last = *x;
            }
            last
        })
        .collect())
}

/// Check that the AR polynomial `1 - a_1 B - ... - a_p B^p` has all roots
/// outside the unit circle, using the step-down (reverse Levinson) recursion
pub fn is_stationary(coefficients: &[f64]) -> bool {
    let mut a: Vec<f64> = coefficients.to_vec();
    while let Some(&last) = a.last() {
        if last == 0.0 {
            a.pop();
        } else {
            break;
        }
    }

    while !a.is_empty() {
        let p = a.len();
        let k = a[p - 1];
        if !k.is_finite() || k.abs() >= 1.0 {
            return false;
        }
        let denom = 1.0 - k * k;
        let next: Vec<f64> = (0..p - 1)
            .map(|i| (a[i] + k * a[p - 2 - i]) / denom)
            .collect();
        a = next;
    }
    true
}

/// KPSS level-stationarity statistic with a Bartlett long-run variance
pub fn kpss_statistic(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let m = values.iter().sum::<f64>() / n as f64;
    let resid: Vec<f64> = values.iter().map(|v| v - m).collect();

    let mut partial = 0.0;
    let mut eta = 0.0;
    for r in &resid {
        partial += r;
        eta += partial * partial;
    }
    eta /= (n * n) as f64;

    let lags = (4.0 * (n as f64 / 100.0).powf(0.25)).trunc() as usize;
    let mut lr_var = resid.iter().map(|r| r * r).sum::<f64>() / n as f64;
    for lag in 1..=lags.min(n - 1) {
        let weight = 1.0 - lag as f64 / (lags as f64 + 1.0);
        let cov: f64 = (lag..n).map(|i| resid[i] * resid[i - lag]).sum::<f64>() / n as f64;
        lr_var += 2.0 * weight * cov;
    }

    if lr_var <= f64::EPSILON {
        return Some(0.0);
    }
    Some(eta / lr_var)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn difference_removes_linear_trend() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let d1 = difference(&values, 1, 1);
        assert_eq!(d1.len(), 9);
        assert!(d1.iter().all(|v| (*v - 2.0).abs() < 1e-12));
        assert!(difference(&values, 1, 2).iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn difference_operator_expands_seasonal_terms() {
        let op = difference_operator(1, 1, 4);
        assert_eq!(op, vec![1.0, -1.0, 0.0, 0.0, -1.0, 1.0]);
        assert_eq!(difference_operator(0, 0, 12), vec![1.0]);
    }

    #[test]
    fn fill_missing_forward_and_leading() {
        let filled = fill_missing(&[None, Some(2.0), None, Some(5.0), None]).unwrap();
        assert_eq!(filled, vec![2.0, 2.0, 2.0, 5.0, 5.0]);
        assert!(fill_missing(&[None, None]).is_err());
    }

    #[test]
    fn stationarity_check_matches_known_cases() {
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(!is_stationary(&[1.2]));
        assert!(is_stationary(&[0.5, 0.3]));
        assert!(!is_stationary(&[0.7, 0.5]));
        assert!(is_stationary(&[]));
    }

    #[test]
    fn kpss_flags_random_walk_like_trend() {
        let level: Vec<f64> = (0..100).map(|i| ((i * 7) % 11) as f64).collect();
        let trend: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let stat_level = kpss_statistic(&level).unwrap();
        let stat_trend = kpss_statistic(&trend).unwrap();
        assert!(stat_level < 0.463);
        assert!(stat_trend > 0.463);
        assert_relative_eq!(kpss_statistic(&[1.0; 10]).unwrap(), 0.0);
    }
}
