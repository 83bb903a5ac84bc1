//! Classical seasonal decomposition
//!
//! Centered moving-average trend, per-position seasonal indices and the ACF
//! based seasonality test used by the theta family.

use crate::stats::{acf, variance};
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// How the seasonal component combines with the rest of the series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecompositionType {
    Additive,
    Multiplicative,
}

/// Result of a classical decomposition
#[derive(Debug, Clone)]
pub struct SeasonalDecomposition {
    /// Decomposition type actually used
    pub kind: DecompositionType,
    /// Seasonal period
    pub period: usize,
    /// One index per position in the cycle, aligned so that index `i % period`
    /// applies to observation `i`
    pub indices: Vec<f64>,
    /// Centered moving-average trend (NaN at the edges)
    pub trend: Vec<f64>,
}

impl SeasonalDecomposition {
    /// Decompose `values` with the given period and type
    pub fn fit(values: &[f64], period: usize, kind: DecompositionType) -> Result<Self> {
        if period < 2 {
            return Err(MathError::InvalidInput(
                "Seasonal period must be at least 2".to_string(),
            ));
        }
        if values.len() < 2 * period {
            return Err(MathError::InsufficientData(format!(
                "need at least {} observations for period {}, got {}",
                2 * period,
                period,
                values.len()
            )));
        }
        if kind == DecompositionType::Multiplicative && values.iter().any(|v| *v <= 0.0) {
            return Err(MathError::InvalidInput(
                "Multiplicative decomposition requires strictly positive data".to_string(),
            ));
        }

        let trend = centered_moving_average(values, period);

        let mut sums = vec![0.0; period];
        let mut counts = vec![0usize; period];
        for (i, (&y, &t)) in values.iter().zip(trend.iter()).enumerate() {
            if !t.is_finite() {
                continue;
            }
            let detrended = match kind {
                DecompositionType::Additive => y - t,
                DecompositionType::Multiplicative => {
                    if t.abs() < 1e-12 {
                        continue;
                    }
                    y / t
                }
            };
            sums[i % period] += detrended;
            counts[i % period] += 1;
        }

        let mut indices: Vec<f64> = sums
            .iter()
            .zip(counts.iter())
            .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
            .collect();

        let avg = indices.iter().sum::<f64>() / period as f64;
        match kind {
            DecompositionType::Additive => indices.iter_mut().for_each(|s| *s -= avg),
            DecompositionType::Multiplicative => {
                if avg.abs() > 1e-12 {
                    indices.iter_mut().for_each(|s| *s /= avg);
                }
            }
        }

        Ok(Self {
            kind,
            period,
            indices,
            trend,
        })
    }

    /// Seasonal index for absolute position `i`
    pub fn index_at(&self, i: usize) -> f64 {
        self.indices[i % self.period]
    }

    /// Remove the seasonal component from `values` starting at position `offset`
    pub fn deseasonalize(&self, values: &[f64], offset: usize) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                let s = self.index_at(offset + i);
                match self.kind {
                    DecompositionType::Additive => y - s,
                    DecompositionType::Multiplicative => y / s,
                }
            })
            .collect()
    }

    /// Re-apply the seasonal component to `values` starting at position `offset`
    pub fn reseasonalize(&self, values: &[f64], offset: usize) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                let s = self.index_at(offset + i);
                match self.kind {
                    DecompositionType::Additive => y + s,
                    DecompositionType::Multiplicative => y * s,
                }
            })
            .collect()
    }

    /// Strength of seasonality in [0, 1]: `1 - Var(remainder) / Var(season + remainder)`
    pub fn strength(&self, values: &[f64]) -> f64 {
        let mut detrended = Vec::new();
        let mut remainder = Vec::new();
        for (i, (&y, &t)) in values.iter().zip(self.trend.iter()).enumerate() {
            if !t.is_finite() {
                continue;
            }
            let s = self.index_at(i);
            match self.kind {
                DecompositionType::Additive => {
                    detrended.push(y - t);
                    remainder.push(y - t - s);
                }
                DecompositionType::Multiplicative => {
                    detrended.push(y / t);
                    remainder.push(y / t / s);
                }
            }
        }
        match (variance(&remainder, 1), variance(&detrended, 1)) {
            (Some(vr), Some(vd)) if vd > 0.0 => (1.0 - vr / vd).max(0.0),
            _ => 0.0,
        }
    }
}

/// Centered moving average of width `period` (2x`period` MA for even periods)
pub fn centered_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut trend = vec![f64::NAN; n];
    if period == 0 || n < period {
        return trend;
    }
    let half = period / 2;
    for i in half..n.saturating_sub(half) {
        let value = if period % 2 == 0 {
            let mut s = 0.5 * values[i - half] + 0.5 * values[i + half];
            s += values[(i - half + 1)..(i + half)].iter().sum::<f64>();
            s / period as f64
        } else {
            values[(i - half)..=(i + half)].iter().sum::<f64>() / period as f64
        };
        trend[i] = value;
    }
    trend
}

/// ACF seasonality test at the 90% level: the autocorrelation at `period` is
/// significant against the Bartlett standard error of the lower lags
pub fn seasonal_test(values: &[f64], period: usize) -> bool {
    if period < 2 || values.len() < 2 * period {
        return false;
    }
    let r = acf(values, period);
    let lower: f64 = r[1..period].iter().map(|x| x * x).sum();
    let stat = ((1.0 + 2.0 * lower) / values.len() as f64).sqrt();

    let z = match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.inverse_cdf(0.95),
        Err(_) => return false,
    };
    r[period].abs() / stat > z
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn seasonal_series(n: usize, period: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                10.0 + 0.05 * i as f64
                    + 2.0 * (2.0 * std::f64::consts::PI * i as f64 / period as f64).sin()
            })
            .collect()
    }

    #[test]
    fn additive_indices_sum_to_zero() {
        let values = seasonal_series(48, 12);
        let dec = SeasonalDecomposition::fit(&values, 12, DecompositionType::Additive).unwrap();
        assert_relative_eq!(dec.indices.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
        assert!(dec.strength(&values) > 0.9);
    }

    #[test]
    fn deseasonalize_roundtrips() {
        let values = seasonal_series(36, 12);
        let dec =
            SeasonalDecomposition::fit(&values, 12, DecompositionType::Multiplicative).unwrap();
        let back = dec.reseasonalize(&dec.deseasonalize(&values, 0), 0);
        for (a, b) in values.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn multiplicative_rejects_non_positive() {
        let mut values = seasonal_series(36, 12);
        values[3] = -1.0;
        assert!(
            SeasonalDecomposition::fit(&values, 12, DecompositionType::Multiplicative).is_err()
        );
    }

    #[test]
    fn seasonal_test_detects_cycle() {
        let cycle: Vec<f64> = (0..120)
            .map(|i| 5.0 + (2.0 * std::f64::consts::PI * i as f64 / 12.0).cos())
            .collect();
        assert!(seasonal_test(&cycle, 12));
        let trend: Vec<f64> = (0..60).map(|i| i as f64).collect();
        assert!(!seasonal_test(&trend, 12));
    }

    #[test]
    fn centered_ma_even_period_has_nan_edges() {
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let trend = centered_moving_average(&values, 4);
        assert!(trend[0].is_nan() && trend[1].is_nan());
        assert_relative_eq!(trend[2], 2.0);
        assert!(trend[7].is_nan());
    }
}
