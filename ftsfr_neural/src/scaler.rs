//! Per-window temporal normalisation
//!
//! Each input window is centred and scaled by statistics of its own observed
//! values; the target and the network output share the window's statistics.

use ftsfr_math::stats::{median, median_abs_deviation, std_dev};
use serde::{Deserialize, Serialize};

const MIN_SCALE: f64 = 1e-8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerType {
    /// Median and median absolute deviation
    #[default]
    Robust,
    /// Mean and standard deviation
    Standard,
    Identity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScale {
    pub center: f64,
    pub scale: f64,
}

impl WindowScale {
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.scale + self.center
    }
}

impl ScalerType {
    /// Statistics of the observed values of one window. A degenerate spread
    /// falls back to the standard deviation, then to 1
    pub fn fit(&self, observed: &[f64]) -> WindowScale {
        let fallback_scale = || match std_dev(observed, 0) {
            Some(sd) if sd > MIN_SCALE => sd,
            _ => 1.0,
        };
        match self {
            ScalerType::Robust => {
                let center = median(observed).unwrap_or(0.0);
                let scale = match median_abs_deviation(observed) {
                    Some(mad) if mad > MIN_SCALE => mad,
                    _ => fallback_scale(),
                };
                WindowScale { center, scale }
            }
            ScalerType::Standard => WindowScale {
                center: ftsfr_math::mean(observed).unwrap_or(0.0),
                scale: fallback_scale(),
            },
            ScalerType::Identity => WindowScale {
                center: 0.0,
                scale: 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn robust_scale_uses_median_and_mad() {
        let s = ScalerType::Robust.fit(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_eq!(s.center, 3.0);
        assert_eq!(s.scale, 1.0);
        assert_relative_eq!(s.inverse(s.transform(42.0)), 42.0);
    }

    #[test]
    fn constant_window_falls_back_to_unit_scale() {
        let s = ScalerType::Robust.fit(&[5.0; 6]);
        assert_eq!(s, WindowScale { center: 5.0, scale: 1.0 });
    }

    #[test]
    fn mad_of_zero_falls_back_to_std() {
        let s = ScalerType::Robust.fit(&[0.0, 0.0, 0.0, 0.0, 4.0]);
        assert_eq!(s.center, 0.0);
        assert_relative_eq!(s.scale, 1.6, epsilon = 1e-12);
    }
}
