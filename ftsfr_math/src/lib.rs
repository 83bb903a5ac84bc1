//! # FTSFR Math
//!
//! Numeric building blocks shared by the forecasting backends and the
//! evaluation harness.
//!
//! - Null-aware descriptive statistics
//! - Series transforms (lags, differences, fills)
//! - Classical seasonal decomposition and seasonality tests
//! - Derivative-free optimization

use thiserror::Error;

pub mod decomposition;
pub mod optimization;
pub mod stats;
pub mod transform;

pub use decomposition::{seasonal_test, DecompositionType, SeasonalDecomposition};
pub use optimization::{nelder_mead, NelderMeadConfig, NelderMeadResult};
pub use stats::{mean, median, quantile, std_dev, variance};

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;
