//! Complex exponential smoothing
//!
//! The level/information pair `(l, c)` evolves with the complex smoothing
//! parameter `a0 + i a1`. The non-seasonal form uses one pair; the simple
//! seasonal form keeps one pair per position of the cycle.

use crate::error::{ModelError, Result};
use crate::models::{require_len, ForecastModel, ForecastResult, TrainedForecastModel};
use ftsfr_math::{nelder_mead, NelderMeadConfig};

/// CES variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CesForm {
    /// Non-seasonal
    None,
    /// Simple seasonal: states lagged by the season length
    Simple,
}

#[derive(Debug, Clone, Copy)]
struct CesParams {
    a0: f64,
    a1: f64,
}

impl CesParams {
    /// Eigenvalues of the discount matrix `F - g w'` inside the unit circle
    fn stable(&self) -> bool {
        let (a0, a1) = (self.a0, self.a1);
        let d11 = 1.0 - (a0 - a1);
        let d12 = -(1.0 - a1);
        let d21 = 1.0 - (a0 + a1);
        let d22 = 1.0 - a0;
        let trace = d11 + d22;
        let det = d11 * d22 - d12 * d21;
        det.abs() < 1.0 && trace.abs() < 1.0 + det
    }

    /// One step of the state equations given the error `e`
    fn step(&self, level: f64, info: f64, e: f64) -> (f64, f64) {
        let next_level = level - (1.0 - self.a1) * info + (self.a0 - self.a1) * e;
        let next_info = level + (1.0 - self.a0) * info + (self.a0 + self.a1) * e;
        (next_level, next_info)
    }
}

/// Run the filter, returning the SSE and final states ordered so that
/// `states[0]` produces the next forecast
fn filter(y: &[f64], params: CesParams, init: &[(f64, f64)]) -> (f64, Vec<(f64, f64)>) {
    let lag = init.len();
    let mut states = init.to_vec();
    let mut sse = 0.0;
    for (t, &obs) in y.iter().enumerate() {
        let slot = t % lag;
        let (level, info) = states[slot];
        let e = obs - level;
        sse += e * e;
        states[slot] = params.step(level, info, e);
    }
    let offset = y.len() % lag;
    states.rotate_left(offset);
    (sse, states)
}

fn initial_states(y: &[f64], form: CesForm, m: usize) -> Vec<(f64, f64)> {
    match form {
        CesForm::None => {
            let k = y.len().min(10);
            let level = y[..k].iter().sum::<f64>() / k as f64;
            vec![(level, level / 1.1)]
        }
        CesForm::Simple => y[..m].iter().map(|v| (*v, v / 1.1)).collect(),
    }
}

/// CES model fitted to one series
#[derive(Debug, Clone)]
pub struct FittedCes {
    form: CesForm,
    params: CesParams,
    states: Vec<(f64, f64)>,
    aic: f64,
}

impl FittedCes {
    pub fn form(&self) -> CesForm {
        self.form
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    /// Complex smoothing parameter `(a0, a1)`
    pub fn smoothing(&self) -> (f64, f64) {
        (self.params.a0, self.params.a1)
    }
}

impl TrainedForecastModel for FittedCes {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let mut states = self.states.clone();
        let lag = states.len();
        let mut values = Vec::with_capacity(horizon);
        for h in 0..horizon {
            let slot = h % lag;
            let (level, info) = states[slot];
            values.push(level);
            states[slot] = self.params.step(level, info, 0.0);
        }
        ForecastResult::new(values, horizon)
    }

    fn name(&self) -> &str {
        "CES"
    }
}

fn fit_form(y: &[f64], form: CesForm, m: usize) -> Option<FittedCes> {
    let lag = match form {
        CesForm::None => 1,
        CesForm::Simple => m,
    };
    if form == CesForm::Simple && (m < 2 || y.len() < 2 * m) {
        return None;
    }
    let init = initial_states(y, form, lag);

    let objective = |x: &[f64]| {
        let params = CesParams { a0: x[0], a1: x[1] };
        if !params.stable() {
            return f64::NAN;
        }
        filter(y, params, &init).0
    };
    let bounds = [(0.01, 2.5), (0.01, 2.5)];
    let result = nelder_mead(
        &objective,
        &[1.3, 1.0],
        Some(&bounds),
        &NelderMeadConfig::default().with_max_iter(500),
    );
    if !result.value.is_finite() {
        return None;
    }
    let params = CesParams {
        a0: result.point[0],
        a1: result.point[1],
    };
    let (sse, states) = filter(y, params, &init);

    let n = y.len() as f64;
    // Two smoothing parameters plus two initial states per slot
    let k = 2 + 2 * lag;
    let aic = n * (sse / n).max(f64::MIN_POSITIVE).ln() + 2.0 * k as f64;
    aic.is_finite().then_some(FittedCes {
        form,
        params,
        states,
        aic,
    })
}

/// Automatic CES: non-seasonal vs simple seasonal by AIC
#[derive(Debug, Clone)]
pub struct AutoCes {
    season_length: usize,
}

impl AutoCes {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length: season_length.max(1),
        }
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedCes> {
        require_len(values, 3, self.name())?;
        [CesForm::None, CesForm::Simple]
            .into_iter()
            .filter_map(|form| fit_form(values, form, self.season_length))
            .min_by(|a, b| a.aic.total_cmp(&b.aic))
            .ok_or_else(|| ModelError::FitError("CES could not be estimated".to_string()))
    }
}

impl ForecastModel for AutoCes {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "CES"
    }
}
