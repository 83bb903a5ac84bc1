//! Error types for the ftsfr_models crate

use ftsfr_math::MathError;
use thiserror::Error;

/// Errors raised while fitting or forecasting a statistical model
#[derive(Debug, Error)]
pub enum ModelError {
    /// Too few observations for the requested model
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The model could not be fitted to the series
    #[error("Fit error: {0}")]
    FitError(String),

    /// Error related to forecast validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from numeric primitives
    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ModelError>;
