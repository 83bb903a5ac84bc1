//! Error types for the ftsfr_forecast crate

use crate::frequency::Frequency;
use crate::preprocess::{FilterReport, QualityRequirements};
use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single (dataset, model) run, plus the I/O plumbing around it
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The dataset name is in no module of the catalog
    #[error("dataset '{name}' not found; known datasets: {}", known.join(", "))]
    DatasetNotFound { name: String, known: Vec<String> },

    /// The model name is not in the model catalog
    #[error("model '{name}' not found; known models: {}", known.join(", "))]
    ModelNotFound { name: String, known: Vec<String> },

    /// Required column missing or of an unusable type
    #[error("schema error in {dataset}: {message}")]
    SchemaError { dataset: String, message: String },

    /// Parquet missing, unreadable or empty
    #[error("data unavailable for {dataset} at {}: {reason}", path.display())]
    DataUnavailable {
        dataset: String,
        path: PathBuf,
        reason: String,
    },

    /// Preprocessing rejected every series
    #[error(
        "no valid series in {dataset} (frequency {frequency}, horizon {horizon}); {requirements}; {report}"
    )]
    NoValidSeries {
        dataset: String,
        frequency: Frequency,
        horizon: usize,
        requirements: QualityRequirements,
        report: FilterReport,
    },

    /// A metric is NaN, infinite, or degenerate
    #[error("metric computation failed for {dataset}/{model}: {field} = {value}")]
    MetricComputationError {
        dataset: String,
        model: String,
        field: String,
        value: f64,
    },

    /// The forecasting backend raised
    #[error("backend failure in {dataset}/{model}: {message}")]
    BackendFailure {
        dataset: String,
        model: String,
        message: String,
    },

    /// Settings or catalog could not be read
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Unknown frequency code
    #[error("invalid frequency '{0}'")]
    InvalidFrequency(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error reading or writing CSV files
    #[error("CSV error: {0}")]
    CsvError(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::ConfigError(err.to_string())
    }
}

impl From<figment::Error> for ForecastError {
    fn from(err: figment::Error) -> Self {
        ForecastError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_not_found_lists_known_names() {
        let err = ForecastError::DatasetNotFound {
            name: "ftsfr_missing".to_string(),
            known: vec!["ftsfr_a".to_string(), "ftsfr_b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "dataset 'ftsfr_missing' not found; known datasets: ftsfr_a, ftsfr_b"
        );
    }

    #[test]
    fn messages_are_single_line() {
        let err = ForecastError::NoValidSeries {
            dataset: "ftsfr_demo".to_string(),
            frequency: Frequency::MonthEnd,
            horizon: 36,
            requirements: QualityRequirements::for_frequency(Frequency::MonthEnd, 36, 12),
            report: FilterReport::default(),
        };
        let text = err.to_string();
        assert!(!text.contains('\n'));
        assert!(text.contains("frequency ME"));
        assert!(text.contains("min_total_obs=63"));
    }
}
