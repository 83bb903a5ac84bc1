//! # FTSFR Models
//!
//! Statistical forecasting backend for the benchmark harness.
//!
//! ## Features
//!
//! - Long-format series and forecast tables (`SeriesFrame`, `ForecastTable`)
//! - Baselines: historic average, seasonal naive
//! - Exponential smoothing: automatic ETS, SES, Holt-Winters
//! - AutoARIMA with a stepwise order search
//! - Complex exponential smoothing, Croston, standard and dynamic theta
//! - Cross-validation over a panel with a per-series fallback model
//!
//! ## Quick Start
//!
//! ```rust
//! use ftsfr_models::models::{AutoEts, ForecastModel, SeasonalNaive};
//! use ftsfr_models::{CrossValidation, SeriesFrame};
//! use chrono::{Months, NaiveDate};
//!
//! let start = NaiveDate::from_ymd_opt(2000, 1, 31).unwrap();
//! let ds: Vec<NaiveDate> = (0..48).map(|i| start + Months::new(i)).collect();
//! let y = (0..48).map(|i| Some(10.0 + (i % 12) as f64)).collect();
//! let frames = vec![SeriesFrame::new("s1", ds, y)];
//!
//! let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(AutoEts::new(12))];
//! let fallback = SeasonalNaive::new(12).unwrap();
//! let cv = CrossValidation::single_window(12).unwrap();
//! let table = cv.run(&frames, &models, Some(&fallback as &dyn ForecastModel)).unwrap();
//! assert_eq!(table.len(), 12);
//! ```

pub mod cross_validation;
pub mod error;
pub mod frame;
pub mod models;

// Re-export commonly used types
pub use crate::cross_validation::CrossValidation;
pub use crate::error::{ModelError, Result};
pub use crate::frame::{ForecastRow, ForecastTable, SeriesFrame};
pub use crate::models::{ForecastModel, ForecastResult, TrainedForecastModel};
