//! Theta family: standard theta and dynamic optimised theta
//!
//! Both run the same state recursion (SES level, running mean, trend line
//! `A + B t`). The standard method fixes `theta = 2` and uses a least-squares
//! trend over the whole history; the dynamic method updates `A` and `B` as
//! observations arrive and optimises `theta`. Seasonal series are adjusted
//! with a classical decomposition first.

use crate::error::{ModelError, Result};
use crate::models::{require_len, ForecastModel, ForecastResult, TrainedForecastModel};
use ftsfr_math::{
    nelder_mead, seasonal_test, DecompositionType, NelderMeadConfig, SeasonalDecomposition,
};

/// Theta variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThetaVariant {
    /// Standard theta method, theta fixed at 2
    Standard,
    /// Dynamic optimised theta
    Dynamic,
}

#[derive(Debug, Clone, Copy)]
struct ThetaState {
    level: f64,
    mean_y: f64,
    a: f64,
    b: f64,
}

#[derive(Debug, Clone, Copy)]
struct ThetaParams {
    alpha: f64,
    theta: f64,
    level0: f64,
}

/// `mu = level + (1 - 1/theta) (A (1-alpha)^t + B ((h-1) + (1 - (1-alpha)^(t+1)) / alpha))`
fn project(state: &ThetaState, p: &ThetaParams, t: usize, h: usize) -> f64 {
    let beta = 1.0 - p.alpha;
    let drift = state.a * beta.powi(t as i32)
        + state.b * ((h - 1) as f64 + (1.0 - beta.powi(t as i32 + 1)) / p.alpha);
    state.level + (1.0 - 1.0 / p.theta) * drift
}

/// Least-squares `y = A + B t` with `t = 1..n`
fn trend_line(y: &[f64]) -> (f64, f64) {
    let n = y.len() as f64;
    let t_mean = (n + 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut stt = 0.0;
    let mut sty = 0.0;
    for (i, v) in y.iter().enumerate() {
        let dt = (i + 1) as f64 - t_mean;
        stt += dt * dt;
        sty += dt * (v - y_mean);
    }
    let b = if stt > 0.0 { sty / stt } else { 0.0 };
    (y_mean - b * t_mean, b)
}

/// Filter `y` returning the one-step SSE and the state after the last value
fn run(y: &[f64], variant: ThetaVariant, p: &ThetaParams) -> (f64, ThetaState) {
    let (a, b) = match variant {
        ThetaVariant::Standard => trend_line(y),
        ThetaVariant::Dynamic => (y[0], 0.0),
    };
    let mut state = ThetaState {
        level: p.level0,
        mean_y: y[0],
        a,
        b,
    };

    let mut sse = 0.0;
    for (i, &obs) in y.iter().enumerate().skip(1) {
        let t = i + 1;
        let mu = project(&state, p, t - 1, 1);
        sse += (obs - mu).powi(2);

        state.level = p.alpha * obs + (1.0 - p.alpha) * state.level;
        if variant == ThetaVariant::Dynamic {
            let tf = t as f64;
            let mean_prev = state.mean_y;
            state.mean_y = ((tf - 1.0) * mean_prev + obs) / tf;
            state.b = ((tf - 2.0) * state.b + 6.0 * (obs - mean_prev) / tf) / (tf + 1.0);
            state.a = state.mean_y - state.b * (tf + 1.0) / 2.0;
        }
    }
    (sse, state)
}

/// Theta model fitted to one series
#[derive(Debug, Clone)]
pub struct FittedTheta {
    name: &'static str,
    params: ThetaParams,
    state: ThetaState,
    n: usize,
    decomposition: Option<SeasonalDecomposition>,
}

impl FittedTheta {
    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    pub fn theta(&self) -> f64 {
        self.params.theta
    }

    pub fn is_seasonal(&self) -> bool {
        self.decomposition.is_some()
    }
}

impl TrainedForecastModel for FittedTheta {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let values: Vec<f64> = (1..=horizon)
            .map(|h| project(&self.state, &self.params, self.n, h))
            .collect();
        let values = match &self.decomposition {
            Some(dec) => dec.reseasonalize(&values, self.n),
            None => values,
        };
        ForecastResult::new(values, horizon)
    }

    fn name(&self) -> &str {
        self.name
    }
}

fn fit_theta(
    values: &[f64],
    variant: ThetaVariant,
    season_length: usize,
    name: &'static str,
) -> Result<FittedTheta> {
    require_len(values, 3, name)?;
    let n = values.len();

    let decomposition = if season_length > 1 && seasonal_test(values, season_length) {
        let kind = if values.iter().all(|v| *v > 0.0) {
            DecompositionType::Multiplicative
        } else {
            DecompositionType::Additive
        };
        Some(SeasonalDecomposition::fit(values, season_length, kind)?)
    } else {
        None
    };
    let y = match &decomposition {
        Some(dec) => dec.deseasonalize(values, 0),
        None => values.to_vec(),
    };

    let lo = y.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (hi - lo).max(1e-8);
    let level_bounds = (lo - span, hi + span);

    let unpack = |x: &[f64]| match variant {
        ThetaVariant::Standard => ThetaParams {
            alpha: x[0],
            theta: 2.0,
            level0: x[1],
        },
        ThetaVariant::Dynamic => ThetaParams {
            alpha: x[0],
            theta: x[1],
            level0: x[2],
        },
    };
    let (start, bounds) = match variant {
        ThetaVariant::Standard => (vec![0.5, y[0]], vec![(0.1, 0.99), level_bounds]),
        ThetaVariant::Dynamic => (
            vec![0.5, 2.0, y[0]],
            vec![(0.1, 0.99), (1.0, 20.0), level_bounds],
        ),
    };

    let objective = |x: &[f64]| run(&y, variant, &unpack(x)).0;
    let result = nelder_mead(
        &objective,
        &start,
        Some(&bounds),
        &NelderMeadConfig::default().with_max_iter(600),
    );
    if !result.value.is_finite() {
        return Err(ModelError::FitError(format!("{} did not converge", name)));
    }

    let params = unpack(&result.point);
    let (_, state) = run(&y, variant, &params);
    Ok(FittedTheta {
        name,
        params,
        state,
        n,
        decomposition,
    })
}

/// Standard theta method
#[derive(Debug, Clone)]
pub struct Theta {
    season_length: usize,
}

impl Theta {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length: season_length.max(1),
        }
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedTheta> {
        fit_theta(values, ThetaVariant::Standard, self.season_length, "Theta")
    }
}

impl ForecastModel for Theta {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "Theta"
    }
}

/// Dynamic optimised theta
#[derive(Debug, Clone)]
pub struct DynamicOptimizedTheta {
    season_length: usize,
}

impl DynamicOptimizedTheta {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length: season_length.max(1),
        }
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedTheta> {
        fit_theta(
            values,
            ThetaVariant::Dynamic,
            self.season_length,
            "DynamicOptimizedTheta",
        )
    }
}

impl ForecastModel for DynamicOptimizedTheta {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "DynamicOptimizedTheta"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 10.0 + 0.5 * i as f64 + 0.01 * ((i * 3) % 4) as f64)
            .collect()
    }

    #[test]
    fn dynamic_trend_recovers_exact_line() {
        let y: Vec<f64> = (1..=20).map(|t| 3.0 + 2.0 * t as f64).collect();
        let p = ThetaParams {
            alpha: 0.5,
            theta: 2.0,
            level0: y[0],
        };
        let (_, state) = run(&y, ThetaVariant::Dynamic, &p);
        assert_relative_eq!(state.b, 2.0, epsilon = 1e-9);
        assert_relative_eq!(state.a, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn standard_theta_carries_half_the_drift() {
        let fit = Theta::new(1).fit(&linear(60)).unwrap();
        assert_eq!(fit.theta(), 2.0);
        let f = fit.forecast(10).unwrap();
        let per_step = (f.values()[9] - f.values()[0]) / 9.0;
        assert_relative_eq!(per_step, 0.25, epsilon = 0.02);
    }

    #[test]
    fn dynamic_theta_follows_trend() {
        let fit = DynamicOptimizedTheta::new(1).fit(&linear(60)).unwrap();
        assert!(fit.theta() > 2.0);
        let f = fit.forecast(10).unwrap();
        assert!(f.values()[9] - f.values()[0] > 3.0);
    }

    #[test]
    fn seasonal_series_is_deseasonalised() {
        let y: Vec<f64> = (0..96)
            .map(|i| 30.0 + 6.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).cos())
            .collect();
        let fit = Theta::new(12).fit(&y[..84]).unwrap();
        assert!(fit.is_seasonal());
        let f = fit.forecast(12).unwrap();
        let mae: f64 = f
            .values()
            .iter()
            .zip(&y[84..])
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / 12.0;
        assert!(mae < 1.5, "mae {}", mae);
    }
}
