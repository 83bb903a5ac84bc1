//! Seasonal ARIMA with conditional-sum-of-squares estimation and a stepwise
//! order search

use crate::error::{ModelError, Result};
use crate::models::{require_len, sse, ForecastModel, ForecastResult, TrainedForecastModel};
use ftsfr_math::transform::{difference, difference_operator, is_stationary, kpss_statistic, poly_mul};
use ftsfr_math::{nelder_mead, std_dev, DecompositionType, NelderMeadConfig, SeasonalDecomposition};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// KPSS 5% critical value for level stationarity
const KPSS_CRITICAL: f64 = 0.463;
/// Seasonal strength above which one seasonal difference is taken
const SEASONAL_STRENGTH_THRESHOLD: f64 = 0.64;

/// `(p, d, q)(P, D, Q)[period]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            seasonal_p: 0,
            seasonal_d: 0,
            seasonal_q: 0,
            period: 1,
        }
    }

    pub fn with_seasonal(mut self, p: usize, d: usize, q: usize, period: usize) -> Self {
        self.seasonal_p = p;
        self.seasonal_d = d;
        self.seasonal_q = q;
        self.period = period.max(1);
        self
    }

    fn n_coefficients(&self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if self.period > 1 {
            write!(
                f,
                "({},{},{})[{}]",
                self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
            )?;
        }
        Ok(())
    }
}

/// Coefficients split out of the optimiser's parameter vector
struct Coefficients<'a> {
    phi: &'a [f64],
    theta: &'a [f64],
    seasonal_phi: &'a [f64],
    seasonal_theta: &'a [f64],
    constant: Option<f64>,
}

impl<'a> Coefficients<'a> {
    fn split(order: &ArimaOrder, x: &'a [f64], constant: bool) -> Self {
        let (phi, rest) = x.split_at(order.p);
        let (theta, rest) = rest.split_at(order.q);
        let (seasonal_phi, rest) = rest.split_at(order.seasonal_p);
        let (seasonal_theta, rest) = rest.split_at(order.seasonal_q);
        Self {
            phi,
            theta,
            seasonal_phi,
            seasonal_theta,
            constant: if constant { rest.first().copied() } else { None },
        }
    }

    /// AR polynomial stationary and MA polynomial invertible
    fn admissible(&self) -> bool {
        let neg = |v: &[f64]| v.iter().map(|x| -x).collect::<Vec<_>>();
        is_stationary(self.phi)
            && is_stationary(self.seasonal_phi)
            && is_stationary(&neg(self.theta))
            && is_stationary(&neg(self.seasonal_theta))
    }

    /// Multiply out the seasonal polynomials into plain lag coefficients
    fn expand(&self, period: usize) -> (Vec<f64>, Vec<f64>) {
        let mut ar = vec![1.0];
        ar.extend(self.phi.iter().map(|v| -v));
        let mut seasonal_ar = vec![0.0; self.seasonal_phi.len() * period + 1];
        seasonal_ar[0] = 1.0;
        for (i, v) in self.seasonal_phi.iter().enumerate() {
            seasonal_ar[(i + 1) * period] = -v;
        }
        let ar_full: Vec<f64> = poly_mul(&ar, &seasonal_ar)[1..]
            .iter()
            .map(|v| -v)
            .collect();

        let mut ma = vec![1.0];
        ma.extend(self.theta.iter().copied());
        let mut seasonal_ma = vec![0.0; self.seasonal_theta.len() * period + 1];
        seasonal_ma[0] = 1.0;
        for (i, v) in self.seasonal_theta.iter().enumerate() {
            seasonal_ma[(i + 1) * period] = *v;
        }
        let ma_full = poly_mul(&ma, &seasonal_ma)[1..].to_vec();

        (ar_full, ma_full)
    }
}

/// Conditional residuals of an ARMA recursion around `mean`
fn css_residuals(w: &[f64], ar: &[f64], ma: &[f64], mean: f64) -> Vec<f64> {
    let mut e = vec![0.0; w.len()];
    for t in ar.len()..w.len() {
        let mut pred = mean;
        for (i, a) in ar.iter().enumerate() {
            pred += a * (w[t - i - 1] - mean);
        }
        for (j, b) in ma.iter().enumerate() {
            if t > j {
                pred += b * e[t - j - 1];
            }
        }
        e[t] = w[t] - pred;
    }
    e
}

/// ARIMA model fitted to one series
#[derive(Debug, Clone)]
pub struct FittedArima {
    order: ArimaOrder,
    coefficients: Vec<f64>,
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
    aic: f64,
    history: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
}

impl FittedArima {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }
}

impl TrainedForecastModel for FittedArima {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        for _ in 0..horizon {
            let t = w.len();
            let mut pred = self.mean;
            for (i, a) in self.ar.iter().enumerate() {
                if t > i {
                    pred += a * (w[t - i - 1] - self.mean);
                }
            }
            for (j, b) in self.ma.iter().enumerate() {
                if t > j {
                    pred += b * e[t - j - 1];
                }
            }
            w.push(pred);
            e.push(0.0);
        }

        // Undo the differencing: y_t = w_t - sum_{k>=1} op_k y_{t-k}
        let op = difference_operator(self.order.d, self.order.seasonal_d, self.order.period);
        let mut y = self.history.clone();
        let future = &w[self.differenced.len()..];
        for &wt in future {
            let t = y.len();
            let mut value = wt;
            for (k, coef) in op.iter().enumerate().skip(1) {
                value -= coef * y[t - k];
            }
            y.push(value);
        }
        ForecastResult::new(y[self.history.len()..].to_vec(), horizon)
    }

    fn name(&self) -> &str {
        "AutoARIMA"
    }
}

/// ARIMA with a fixed order
#[derive(Debug, Clone)]
pub struct Arima {
    order: ArimaOrder,
    include_constant: bool,
}

impl Arima {
    pub fn new(order: ArimaOrder, include_constant: bool) -> Self {
        Self {
            order,
            include_constant,
        }
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedArima> {
        require_len(values, 3, "ARIMA")?;
        fit_order(values, self.order, self.include_constant).ok_or_else(|| {
            ModelError::FitError(format!("{} could not be estimated", self.order))
        })
    }
}

impl ForecastModel for Arima {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "ARIMA"
    }
}

fn fit_order(y: &[f64], order: ArimaOrder, constant: bool) -> Option<FittedArima> {
    let op = difference_operator(order.d, order.seasonal_d, order.period);
    let lag = op.len() - 1;
    if y.len() <= lag {
        return None;
    }
    let w: Vec<f64> = (lag..y.len())
        .map(|t| op.iter().enumerate().map(|(k, c)| c * y[t - k]).sum())
        .collect();

    let ar_len = order.p + order.seasonal_p * order.period;
    let k = order.n_coefficients() + usize::from(constant);
    if w.len() <= ar_len + k + 2 {
        return None;
    }
    let n_eff = (w.len() - ar_len) as f64;

    let w_mean = w.iter().sum::<f64>() / w.len() as f64;
    let w_sd = std_dev(&w, 1).unwrap_or(1.0);

    let mut start = vec![0.0; order.n_coefficients()];
    let mut bounds = vec![(-0.99, 0.99); order.n_coefficients()];
    if constant {
        start.push(w_mean);
        bounds.push((w_mean - 10.0 * w_sd - 1.0, w_mean + 10.0 * w_sd + 1.0));
    }

    let objective = |x: &[f64]| {
        let coefs = Coefficients::split(&order, x, constant);
        if !coefs.admissible() {
            return f64::NAN;
        }
        let (ar, ma) = coefs.expand(order.period);
        let e = css_residuals(&w, &ar, &ma, coefs.constant.unwrap_or(0.0));
        n_eff * (sse(&e) / n_eff).max(f64::MIN_POSITIVE).ln()
    };

    let config = NelderMeadConfig::default().with_max_iter((150 * (k + 1)).min(600));
    let result = nelder_mead(&objective, &start, Some(&bounds), &config);
    if !result.value.is_finite() {
        return None;
    }

    let coefs = Coefficients::split(&order, &result.point, constant);
    let mean = coefs.constant.unwrap_or(0.0);
    let (ar, ma) = coefs.expand(order.period);
    let residuals = css_residuals(&w, &ar, &ma, mean);
    let sigma2 = sse(&residuals) / n_eff;
    let aic = n_eff * sigma2.max(f64::MIN_POSITIVE).ln() + 2.0 * (k + 1) as f64;

    Some(FittedArima {
        order,
        coefficients: result.point.clone(),
        ar,
        ma,
        mean,
        sigma2,
        aic,
        history: y.to_vec(),
        differenced: w,
        residuals,
    })
}

/// Orders visited so far and the best fit by AIC
struct StepwiseSearch<'a> {
    values: &'a [f64],
    tried: HashSet<(ArimaOrder, bool)>,
    best: Option<FittedArima>,
    best_constant: bool,
}

impl<'a> StepwiseSearch<'a> {
    fn new(values: &'a [f64]) -> Self {
        Self {
            values,
            tried: HashSet::new(),
            best: None,
            best_constant: false,
        }
    }

    /// Fit a candidate; returns true when it becomes the new best
    fn consider(&mut self, order: ArimaOrder, constant: bool) -> bool {
        if !self.tried.insert((order, constant)) {
            return false;
        }
        match fit_order(self.values, order, constant) {
            Some(fit) if self.best.as_ref().map_or(true, |b| fit.aic < b.aic) => {
                debug!(order = %order, constant, aic = fit.aic, "AutoARIMA new best");
                self.best = Some(fit);
                self.best_constant = constant;
                true
            }
            _ => false,
        }
    }
}

/// Automatic ARIMA order selection (Hyndman-Khandakar stepwise search)
#[derive(Debug, Clone)]
pub struct AutoArima {
    season_length: usize,
    max_p: usize,
    max_q: usize,
    max_seasonal_p: usize,
    max_seasonal_q: usize,
    max_d: usize,
    max_models: usize,
}

impl AutoArima {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length: season_length.max(1),
            max_p: 5,
            max_q: 5,
            max_seasonal_p: 2,
            max_seasonal_q: 2,
            max_d: 2,
            max_models: 94,
        }
    }

    fn seasonal(&self, n: usize) -> bool {
        self.season_length > 1 && n >= 2 * self.season_length
    }

    /// Seasonal differences: one when the classical decomposition shows a
    /// strong seasonal component
    fn select_seasonal_d(&self, values: &[f64]) -> usize {
        if !self.seasonal(values.len()) {
            return 0;
        }
        match SeasonalDecomposition::fit(values, self.season_length, DecompositionType::Additive) {
            Ok(dec) if dec.strength(values) > SEASONAL_STRENGTH_THRESHOLD => 1,
            _ => 0,
        }
    }

    /// Non-seasonal differences by repeated KPSS tests
    fn select_d(&self, values: &[f64]) -> usize {
        let mut d = 0;
        while d < self.max_d {
            let x = difference(values, 1, d);
            match kpss_statistic(&x) {
                Some(stat) if stat > KPSS_CRITICAL => d += 1,
                _ => break,
            }
        }
        d
    }

    pub fn fit(&self, values: &[f64]) -> Result<FittedArima> {
        require_len(values, 4, self.name())?;
        let seasonal = self.seasonal(values.len());
        let period = if seasonal { self.season_length } else { 1 };

        let seasonal_d = self.select_seasonal_d(values);
        let d = self.select_d(&difference(values, period, seasonal_d));
        let allow_constant = d + seasonal_d <= 1;
        debug!(d, seasonal_d, period, "AutoARIMA differencing selected");

        let make = |p, q, sp, sq| {
            ArimaOrder::new(p, d, q).with_seasonal(sp, seasonal_d, sq, period)
        };
        let starts: Vec<ArimaOrder> = if seasonal {
            vec![make(2, 2, 1, 1), make(0, 0, 0, 0), make(1, 0, 1, 0), make(0, 1, 0, 1)]
        } else {
            vec![make(2, 2, 0, 0), make(0, 0, 0, 0), make(1, 0, 0, 0), make(0, 1, 0, 0)]
        };

        let mut search = StepwiseSearch::new(values);
        for order in starts {
            search.consider(order, allow_constant);
        }

        while search.tried.len() < self.max_models {
            let (current, constant) = match &search.best {
                Some(fit) => (fit.order, search.best_constant),
                None => break,
            };
            let improved = self
                .neighbours(current, constant, allow_constant, seasonal)
                .into_iter()
                .any(|(order, constant)| search.consider(order, constant));
            if !improved {
                break;
            }
        }

        match search.best {
            Some(fit) => Ok(fit),
            None => fit_order(values, make(0, 0, 0, 0), false).ok_or_else(|| {
                ModelError::FitError("no ARIMA order could be estimated".to_string())
            }),
        }
    }

    fn neighbours(
        &self,
        current: ArimaOrder,
        constant: bool,
        allow_constant: bool,
        seasonal: bool,
    ) -> Vec<(ArimaOrder, bool)> {
        let steps: &[(i64, i64, i64, i64)] = &[
            (-1, 0, 0, 0),
            (1, 0, 0, 0),
            (0, -1, 0, 0),
            (0, 1, 0, 0),
            (-1, -1, 0, 0),
            (1, 1, 0, 0),
            (0, 0, -1, 0),
            (0, 0, 1, 0),
            (0, 0, 0, -1),
            (0, 0, 0, 1),
            (0, 0, -1, -1),
            (0, 0, 1, 1),
        ];
        let shift = |v: usize, dv: i64, max: usize| -> Option<usize> {
            let next = v as i64 + dv;
            (0..=max as i64).contains(&next).then_some(next as usize)
        };

        let mut out = Vec::new();
        for &(dp, dq, dsp, dsq) in steps {
            if !seasonal && (dsp != 0 || dsq != 0) {
                continue;
            }
            let candidate = (
                shift(current.p, dp, self.max_p),
                shift(current.q, dq, self.max_q),
                shift(current.seasonal_p, dsp, self.max_seasonal_p),
                shift(current.seasonal_q, dsq, self.max_seasonal_q),
            );
            if let (Some(p), Some(q), Some(sp), Some(sq)) = candidate {
                let mut order = current;
                order.p = p;
                order.q = q;
                order.seasonal_p = sp;
                order.seasonal_q = sq;
                out.push((order, constant));
            }
        }
        if allow_constant {
            out.push((current, !constant));
        }
        out
    }
}

impl ForecastModel for AutoArima {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        Ok(Box::new(self.fit(values)?))
    }

    fn name(&self) -> &str {
        "AutoARIMA"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Deterministic noise in roughly [-0.75, 0.75]
    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut next = || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
        };
        (0..n).map(|_| next() + next() + next()).map(|v| v / 2.0).collect()
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let e = noise(400, 7);
        let mut y = vec![0.0; 400];
        for t in 1..400 {
            y[t] = 0.6 * y[t - 1] + e[t];
        }
        let fit = Arima::new(ArimaOrder::new(1, 0, 0), true).fit(&y).unwrap();
        assert_abs_diff_eq!(fit.coefficients()[0], 0.6, epsilon = 0.15);
        assert!(fit.sigma2() > 0.0);
    }

    #[test]
    fn seasonal_difference_only_repeats_last_season() {
        let pattern = [1.0, 4.0, 2.0, 8.0];
        let y: Vec<f64> = (0..24).map(|i| pattern[i % 4]).collect();
        let order = ArimaOrder::new(0, 0, 0).with_seasonal(0, 1, 0, 4);
        let fit = Arima::new(order, false).fit(&y).unwrap();
        let forecast = fit.forecast(6).unwrap();
        let expected = [1.0, 4.0, 2.0, 8.0, 1.0, 4.0];
        for (f, e) in forecast.values().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(f, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn auto_arima_differences_random_walk_with_drift() {
        let e = noise(200, 11);
        let mut y = vec![100.0; 200];
        for t in 1..200 {
            y[t] = y[t - 1] + 1.0 + e[t];
        }
        let fit = AutoArima::new(1).fit(&y).unwrap();
        assert!(fit.order().d >= 1);
        let forecast = fit.forecast(10).unwrap();
        assert!(forecast.is_finite());
        assert!(forecast.values()[9] > forecast.values()[0] + 5.0);
    }

    #[test]
    fn auto_arima_handles_monthly_seasonality() {
        let e = noise(120, 3);
        let y: Vec<f64> = (0..120)
            .map(|i| 20.0 + 3.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin() + e[i])
            .collect();
        let model = AutoArima::new(12);
        let fit = model.fit(&y).unwrap();
        assert_eq!(fit.order().period, 12);
        assert!(fit.forecast(36).unwrap().is_finite());
    }

    #[test]
    fn order_display_includes_seasonal_part() {
        let order = ArimaOrder::new(1, 1, 0).with_seasonal(0, 1, 1, 12);
        assert_eq!(order.to_string(), "ARIMA(1,1,0)(0,1,1)[12]");
        assert_eq!(ArimaOrder::new(2, 0, 1).to_string(), "ARIMA(2,0,1)");
    }
}
