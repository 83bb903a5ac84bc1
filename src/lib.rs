//! # FTSFR
//!
//! Financial time-series forecasting benchmark. This crate re-exports the
//! workspace members:
//!
//! - [`math`]: null-aware statistics, transforms, decomposition, optimisation
//! - [`models`]: statistical models and panel cross-validation
//! - [`neural`]: neural models with hyperparameter search
//! - [`forecast`]: the evaluation harness and its binaries
//!
//! ```
//! use ftsfr_workspace::forecast::Frequency;
//!
//! let monthly: Frequency = "ME".parse().unwrap();
//! assert_eq!(monthly.horizon(), 36);
//! ```

pub use ftsfr_forecast as forecast;
pub use ftsfr_math as math;
pub use ftsfr_models as models;
pub use ftsfr_neural as neural;
