//! Error types for the ftsfr_neural crate

use ftsfr_models::ModelError;
use thiserror::Error;

/// Errors raised while searching, training or forecasting a neural model
#[derive(Debug, Error)]
pub enum NeuralError {
    /// Not enough windows to train or validate on
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Training diverged or produced non-finite values
    #[error("Training error: {0}")]
    TrainingError(String),

    /// The model was used before `fit`
    #[error("Model not fitted: {0}")]
    NotFitted(String),

    /// Error building the forecast table
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Error writing training logs
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error writing CSV logs
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error writing JSON logs
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, NeuralError>;
