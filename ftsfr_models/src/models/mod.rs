//! Forecasting models for univariate series

use crate::error::{ModelError, Result};
use std::fmt::Debug;

/// Forecast result containing predicted values
#[derive(Debug, Clone)]
pub struct ForecastResult {
    /// Forecasted values
    pub(crate) values: Vec<f64>,
    /// Number of periods forecasted
    horizons: usize,
}

impl ForecastResult {
    /// Create a new forecast result
    pub fn new(values: Vec<f64>, horizons: usize) -> Result<Self> {
        if values.len() != horizons {
            return Err(ModelError::ValidationError(format!(
                "Values length ({}) doesn't match horizons ({})",
                values.len(),
                horizons
            )));
        }

        Ok(Self { values, horizons })
    }

    /// Get the forecasted values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get the number of periods forecasted
    pub fn horizons(&self) -> usize {
        self.horizons
    }

    /// Whether every forecasted value is finite
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug + Send {
    /// Generate forecast for future periods
    fn forecast(&self, horizons: usize) -> Result<ForecastResult>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a gap-free series
pub trait ForecastModel: Debug + Send + Sync {
    /// Train the model on the observed values
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>>;

    /// Column name of the model in forecast tables
    fn name(&self) -> &str;
}

pub(crate) fn require_len(values: &[f64], min: usize, model: &str) -> Result<()> {
    if values.len() < min {
        return Err(ModelError::InsufficientData(format!(
            "{} needs at least {} observations, got {}",
            model,
            min,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidParameter(format!(
            "{} received non-finite observations",
            model
        )));
    }
    Ok(())
}

/// Sum of squared one-step errors
pub(crate) fn sse(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

pub mod arima;
pub mod baseline;
pub mod ces;
pub mod croston;
pub mod ets;
pub mod theta;

pub use arima::AutoArima;
pub use baseline::{HistoricAverage, SeasonalNaive};
pub use ces::AutoCes;
pub use croston::CrostonClassic;
pub use ets::{AutoEts, Ets, EtsSpec, HoltWinters, SimpleExponentialSmoothing};
pub use theta::{DynamicOptimizedTheta, Theta};
