//! Exponential smoothing state space models
//!
//! Point forecasts for the ETS family with additive or multiplicative errors,
//! none/additive/damped trend and none/additive/multiplicative seasonality.
//! Smoothing parameters are fitted by maximising the concentrated likelihood;
//! initial states come from a classical decomposition of the history.

use crate::error::{ModelError, Result};
use crate::models::{require_len, ForecastModel, ForecastResult, TrainedForecastModel};
use ftsfr_math::{nelder_mead, DecompositionType, NelderMeadConfig, SeasonalDecomposition};
use std::collections::VecDeque;
use std::fmt;

/// Error component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Additive,
    Multiplicative,
}

/// Trend component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendType {
    None,
    Additive,
    DampedAdditive,
}

/// Seasonal component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonType {
    None,
    Additive,
    Multiplicative,
}

/// Model form `(error, trend, season)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtsSpec {
    pub error: ErrorType,
    pub trend: TrendType,
    pub season: SeasonType,
}

impl EtsSpec {
    pub const fn new(error: ErrorType, trend: TrendType, season: SeasonType) -> Self {
        Self {
            error,
            trend,
            season,
        }
    }

    /// ETS(A,N,N)
    pub const SIMPLE: EtsSpec =
        EtsSpec::new(ErrorType::Additive, TrendType::None, SeasonType::None);

    /// ETS(A,A,N)
    pub const HOLT: EtsSpec =
        EtsSpec::new(ErrorType::Additive, TrendType::Additive, SeasonType::None);

    /// ETS(A,A,A)
    pub const HOLT_WINTERS: EtsSpec =
        EtsSpec::new(ErrorType::Additive, TrendType::Additive, SeasonType::Additive);

    fn has_trend(&self) -> bool {
        self.trend != TrendType::None
    }

    fn has_season(&self) -> bool {
        self.season != SeasonType::None
    }

    /// Number of smoothing parameters
    fn n_smoothing(&self) -> usize {
        1 + usize::from(self.has_trend())
            + usize::from(self.has_season())
            + usize::from(self.trend == TrendType::DampedAdditive)
    }
}

impl fmt::Display for EtsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = match self.error {
            ErrorType::Additive => "A",
            ErrorType::Multiplicative => "M",
        };
        let t = match self.trend {
            TrendType::None => "N",
            TrendType::Additive => "A",
            TrendType::DampedAdditive => "Ad",
        };
        let s = match self.season {
            SeasonType::None => "N",
            SeasonType::Additive => "A",
            SeasonType::Multiplicative => "M",
        };
        write!(f, "ETS({},{},{})", e, t, s)
    }
}

#[derive(Debug, Clone, Copy)]
struct EtsParams {
    alpha: f64,
    beta: f64,
    gamma: f64,
    phi: f64,
}

impl EtsParams {
    fn unpack(spec: EtsSpec, x: &[f64]) -> Self {
        let mut it = x.iter().copied();
        let alpha = it.next().unwrap_or(0.5);
        let beta = if spec.has_trend() {
            it.next().unwrap_or(0.0)
        } else {
            0.0
        };
        let gamma = if spec.has_season() {
            it.next().unwrap_or(0.0)
        } else {
            0.0
        };
        let phi = match spec.trend {
            TrendType::DampedAdditive => it.next().unwrap_or(0.98),
            _ => 1.0,
        };
        Self {
            alpha,
            beta,
            gamma,
            phi,
        }
    }

    fn admissible(&self, spec: EtsSpec) -> bool {
        if spec.has_trend() && self.beta >= self.alpha {
            return false;
        }
        if spec.has_season() && self.gamma >= 1.0 - self.alpha {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
struct EtsState {
    level: f64,
    trend: f64,
    /// Front applies to the next observation
    season: VecDeque<f64>,
}

impl EtsState {
    fn trend_component(&self, spec: EtsSpec, phi: f64) -> f64 {
        match spec.trend {
            TrendType::None => self.level,
            TrendType::Additive => self.level + self.trend,
            TrendType::DampedAdditive => self.level + phi * self.trend,
        }
    }

    fn predict(&self, spec: EtsSpec, phi: f64) -> f64 {
        let t = self.trend_component(spec, phi);
        match spec.season {
            SeasonType::None => t,
            SeasonType::Additive => t + self.season.front().copied().unwrap_or(0.0),
            SeasonType::Multiplicative => t * self.season.front().copied().unwrap_or(1.0),
        }
    }

    /// Advance one step given the raw one-step error `r`
    fn update(&mut self, spec: EtsSpec, p: &EtsParams, r: f64) {
        let t = self.trend_component(spec, p.phi);
        let damped = match spec.trend {
            TrendType::None => 0.0,
            TrendType::Additive => self.trend,
            TrendType::DampedAdditive => p.phi * self.trend,
        };
        match spec.season {
            SeasonType::None => {
                self.level = t + p.alpha * r;
                self.trend = damped + p.beta * r;
            }
            SeasonType::Additive => {
                let s = self.season.pop_front().unwrap_or(0.0);
                self.level = t + p.alpha * r;
                self.trend = damped + p.beta * r;
                self.season.push_back(s + p.gamma * r);
            }
            SeasonType::Multiplicative => {
                let s = self.season.pop_front().unwrap_or(1.0);
                self.level = t + p.alpha * r / s;
                self.trend = damped + p.beta * r / s;
                self.season.push_back(s + p.gamma * r / t);
            }
        }
    }
}

struct Evaluation {
    lik: f64,
    state: EtsState,
}

fn evaluate(spec: EtsSpec, p: &EtsParams, init: &EtsState, y: &[f64]) -> Option<Evaluation> {
    let mut state = init.clone();
    let mut sse = 0.0;
    let mut rel_sse = 0.0;
    let mut log_scale = 0.0;

    for &obs in y {
        let yhat = state.predict(spec, p.phi);
        if !yhat.is_finite() {
            return None;
        }
        if spec.season == SeasonType::Multiplicative {
            let t = state.trend_component(spec, p.phi);
            let s = state.season.front().copied().unwrap_or(1.0);
            if t <= 0.0 || s <= 0.0 {
                return None;
            }
        }
        let r = obs - yhat;
        match spec.error {
            ErrorType::Additive => sse += r * r,
            ErrorType::Multiplicative => {
                if yhat <= 0.0 {
                    return None;
                }
                rel_sse += (r / yhat).powi(2);
                log_scale += yhat.abs().ln();
            }
        }
        state.update(spec, p, r);
    }

    let n = y.len() as f64;
    let lik = match spec.error {
        ErrorType::Additive => n * (sse / n).max(f64::MIN_POSITIVE).ln(),
        ErrorType::Multiplicative => {
            n * (rel_sse / n).max(f64::MIN_POSITIVE).ln() + 2.0 * log_scale
        }
    };
    lik.is_finite().then_some(Evaluation { lik, state })
}

/// Least-squares line through `values` indexed from zero
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (values.first().copied().unwrap_or(0.0), 0.0);
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxx += dx * dx;
        sxy += dx * (y - y_mean);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (y_mean - slope * x_mean, slope)
}

fn initial_state(y: &[f64], spec: EtsSpec, m: usize) -> Option<EtsState> {
    let (season, adjusted): (VecDeque<f64>, Vec<f64>) = match spec.season {
        SeasonType::None => (VecDeque::new(), y.to_vec()),
        SeasonType::Additive | SeasonType::Multiplicative => {
            let kind = if spec.season == SeasonType::Multiplicative {
                DecompositionType::Multiplicative
            } else {
                DecompositionType::Additive
            };
            let dec = SeasonalDecomposition::fit(y, m, kind).ok()?;
            let adjusted = dec.deseasonalize(y, 0);
            (dec.indices.iter().copied().collect(), adjusted)
        }
    };

    let (level, trend) = match spec.trend {
        TrendType::None => {
            if spec.has_season() {
                let head = &adjusted[..m.min(adjusted.len())];
                (head.iter().sum::<f64>() / head.len() as f64, 0.0)
            } else {
                (adjusted[0], 0.0)
            }
        }
        TrendType::Additive | TrendType::DampedAdditive => {
            let k = if spec.has_season() { 2 * m } else { 10 };
            let (intercept, slope) = linear_fit(&adjusted[..k.min(adjusted.len())]);
            // State before the first observation
            (intercept - slope, slope)
        }
    };

    Some(EtsState {
        level,
        trend,
        season,
    })
}

/// Whether a seasonal component can be estimated for this history
fn seasonal_ok(n: usize, m: usize) -> bool {
    m > 1 && m <= 24 && n >= 2 * m
}

/// ETS model fitted to one series
#[derive(Debug, Clone)]
pub struct FittedEts {
    name: String,
    spec: EtsSpec,
    params: EtsParams,
    state: EtsState,
    aicc: f64,
}

impl FittedEts {
    pub fn spec(&self) -> EtsSpec {
        self.spec
    }

    pub fn aicc(&self) -> f64 {
        self.aicc
    }

    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }
}

impl TrainedForecastModel for FittedEts {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let mut state = self.state.clone();
        let mut values = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            values.push(state.predict(self.spec, self.params.phi));
            state.update(self.spec, &self.params, 0.0);
        }
        ForecastResult::new(values, horizon)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fit one ETS form, returning `None` if it is not estimable on `y`
fn fit_spec(y: &[f64], spec: EtsSpec, m: usize, name: &str) -> Option<FittedEts> {
    let n = y.len();
    if spec.has_season() && !seasonal_ok(n, m) {
        return None;
    }
    let positive = y.iter().all(|v| *v > 0.0);
    if (spec.error == ErrorType::Multiplicative || spec.season == SeasonType::Multiplicative)
        && !positive
    {
        return None;
    }

    let init = initial_state(y, spec, m)?;

    let mut start = vec![0.3];
    let mut bounds = vec![(1e-4, 0.9999)];
    if spec.has_trend() {
        start.push(0.05);
        bounds.push((1e-4, 0.9999));
    }
    if spec.has_season() {
        start.push(0.05);
        bounds.push((1e-4, 0.9999));
    }
    if spec.trend == TrendType::DampedAdditive {
        start.push(0.95);
        bounds.push((0.8, 0.98));
    }

    let objective = |x: &[f64]| {
        let p = EtsParams::unpack(spec, x);
        if !p.admissible(spec) {
            return f64::NAN;
        }
        evaluate(spec, &p, &init, y).map_or(f64::NAN, |e| e.lik)
    };

    let config = NelderMeadConfig::default().with_max_iter(400);
    let first = nelder_mead(&objective, &start, Some(&bounds), &config);
    let best = nelder_mead(&objective, &first.point, Some(&bounds), &config);
    let params = EtsParams::unpack(spec, &best.point);
    if !params.admissible(spec) {
        return None;
    }
    let eval = evaluate(spec, &params, &init, y)?;

    // Smoothing parameters, initial states and the variance
    let k = spec.n_smoothing()
        + 1
        + usize::from(spec.has_trend())
        + if spec.has_season() { m - 1 } else { 0 }
        + 1;
    let aic = eval.lik + 2.0 * k as f64;
    let aicc = if n > k + 1 {
        aic + 2.0 * (k * (k + 1)) as f64 / (n - k - 1) as f64
    } else {
        f64::INFINITY
    };

    Some(FittedEts {
        name: name.to_string(),
        spec,
        params,
        state: eval.state,
        aicc,
    })
}

/// ETS with a fixed form and optimised smoothing parameters
#[derive(Debug, Clone)]
pub struct Ets {
    name: String,
    spec: EtsSpec,
    season_length: usize,
}

impl Ets {
    pub fn new(spec: EtsSpec, season_length: usize) -> Self {
        Self {
            name: spec.to_string(),
            spec,
            season_length: season_length.max(1),
        }
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedEts> {
        require_len(values, 2, &self.name)?;
        fit_spec(values, self.spec, self.season_length, &self.name).ok_or_else(|| {
            ModelError::FitError(format!("{} could not be estimated", self.spec))
        })
    }
}

impl ForecastModel for Ets {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Simple exponential smoothing, ETS(A,N,N), with optimised alpha
#[derive(Debug, Clone, Default)]
pub struct SimpleExponentialSmoothing;

impl SimpleExponentialSmoothing {
    pub fn new() -> Self {
        Self
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedEts> {
        require_len(values, 2, self.name())?;
        fit_spec(values, EtsSpec::SIMPLE, 1, self.name())
            .ok_or_else(|| ModelError::FitError("SES could not be estimated".to_string()))
    }
}

impl ForecastModel for SimpleExponentialSmoothing {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "SESOpt"
    }
}

/// Additive Holt-Winters, ETS(A,A,A); falls back to Holt's linear trend when
/// the history is too short for a seasonal component
#[derive(Debug, Clone)]
pub struct HoltWinters {
    season_length: usize,
}

impl HoltWinters {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length: season_length.max(1),
        }
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedEts> {
        require_len(values, 3, self.name())?;
        let spec = if seasonal_ok(values.len(), self.season_length) {
            EtsSpec::HOLT_WINTERS
        } else {
            EtsSpec::HOLT
        };
        fit_spec(values, spec, self.season_length, self.name())
            .or_else(|| fit_spec(values, EtsSpec::HOLT, 1, self.name()))
            .ok_or_else(|| {
                ModelError::FitError("Holt-Winters could not be estimated".to_string())
            })
    }
}

impl ForecastModel for HoltWinters {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "HoltWinters"
    }
}

/// Automatic ETS: fits every admissible form and keeps the lowest AICc
#[derive(Debug, Clone)]
pub struct AutoEts {
    season_length: usize,
}

impl AutoEts {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length: season_length.max(1),
        }
    }

    fn candidates(&self, values: &[f64]) -> Vec<EtsSpec> {
        let positive = values.iter().all(|v| *v > 0.0);
        let errors: &[ErrorType] = if positive {
            &[ErrorType::Additive, ErrorType::Multiplicative]
        } else {
            &[ErrorType::Additive]
        };
        let trends = [
            TrendType::None,
            TrendType::Additive,
            TrendType::DampedAdditive,
        ];
        let mut seasons = vec![SeasonType::None];
        if seasonal_ok(values.len(), self.season_length) {
            seasons.push(SeasonType::Additive);
            if positive {
                seasons.push(SeasonType::Multiplicative);
            }
        }

        let mut out = Vec::new();
        for &error in errors {
            for &trend in &trends {
                for &season in &seasons {
                    // Additive errors with multiplicative seasonality are unstable
                    if error == ErrorType::Additive && season == SeasonType::Multiplicative {
                        continue;
                    }
                    out.push(EtsSpec::new(error, trend, season));
                }
            }
        }
        out
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedEts> {
        require_len(values, 3, self.name())?;
        self.candidates(values)
            .into_iter()
            .filter_map(|spec| fit_spec(values, spec, self.season_length, self.name()))
            .filter(|fit| fit.aicc.is_finite())
            .min_by(|a, b| a.aicc.total_cmp(&b.aicc))
            .ok_or_else(|| ModelError::FitError("no ETS form could be estimated".to_string()))
    }
}

impl ForecastModel for AutoEts {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "AutoETS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                50.0 + 0.2 * i as f64
                    + 5.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin()
                    + 0.3 * ((i * 7) % 5) as f64
            })
            .collect()
    }

    #[test]
    fn ses_forecast_is_flat() {
        let values: Vec<f64> = (0..40).map(|i| 10.0 + ((i * 3) % 7) as f64 * 0.1).collect();
        let fit = SimpleExponentialSmoothing::new().fit(&values).unwrap();
        let forecast = fit.forecast(5).unwrap();
        let first = forecast.values()[0];
        assert!(forecast.values().iter().all(|v| (v - first).abs() < 1e-12));
        assert!((first - 10.3).abs() < 0.5);
        assert!(fit.alpha() > 0.0 && fit.alpha() < 1.0);
    }

    #[test]
    fn holt_winters_tracks_seasonal_pattern() {
        let values = seasonal(96);
        let fit = HoltWinters::new(12).fit(&values[..84]).unwrap();
        assert_eq!(fit.spec(), EtsSpec::HOLT_WINTERS);
        let forecast = fit.forecast(12).unwrap();
        let mae: f64 = forecast
            .values()
            .iter()
            .zip(&values[84..])
            .map(|(f, a)| (f - a).abs())
            .sum::<f64>()
            / 12.0;
        assert!(mae < 2.0, "mae {}", mae);
    }

    #[test]
    fn holt_winters_short_history_drops_season() {
        let values: Vec<f64> = (0..10).map(|i| i as f64 + 1.0).collect();
        let fit = HoltWinters::new(12).fit(&values).unwrap();
        assert_eq!(fit.spec(), EtsSpec::HOLT);
    }

    #[test]
    fn auto_ets_prefers_seasonal_form() {
        let values = seasonal(96);
        let fit = AutoEts::new(12).fit(&values).unwrap();
        assert_ne!(fit.spec().season, SeasonType::None);
        assert!(fit.forecast(24).unwrap().is_finite());
    }

    #[test]
    fn auto_ets_follows_trend() {
        let values: Vec<f64> = (0..60)
            .map(|i| 5.0 + 0.5 * i as f64 + 0.2 * ((i * 5) % 3) as f64)
            .collect();
        let fit = AutoEts::new(1).fit(&values).unwrap();
        let forecast = fit.forecast(10).unwrap();
        assert!(forecast.values()[9] > forecast.values()[0]);
    }

    #[test]
    fn multiplicative_forms_skip_non_positive_data() {
        let values: Vec<f64> = (0..48).map(|i| (i as f64 * 0.7).sin()).collect();
        let specs = AutoEts::new(12).candidates(&values);
        assert!(specs.iter().all(|s| s.error == ErrorType::Additive));
        assert!(specs.iter().all(|s| s.season != SeasonType::Multiplicative));
    }

    #[test]
    fn spec_display_uses_short_codes() {
        let spec = EtsSpec::new(
            ErrorType::Multiplicative,
            TrendType::DampedAdditive,
            SeasonType::Multiplicative,
        );
        assert_eq!(spec.to_string(), "ETS(M,Ad,M)");
    }
}
