//! # FTSFR Forecast
//!
//! Evaluation harness for the financial time-series forecasting benchmark.
//!
//! ## Features
//!
//! - Dataset and model catalogs (`config/datasets.toml`, `config/models.toml`)
//! - Parquet loading into long-format panels
//! - Frequency-aware preprocessing: anchor normalisation, a canonical grid,
//!   a positional train/test split, quality filters and seasonal imputation
//! - Single-window cross-validation over statistical and auto-tuned neural
//!   models
//! - MASE, MSE, RMSE and out-of-sample R² per series, averaged per dataset
//! - Atomic one-row result files with a skip guard for reruns
//! - Aggregation into `results_all.csv` and LaTeX tables, plus dataset
//!   statistics before and after filtering
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ftsfr_forecast::{Harness, Settings};
//!
//! let harness = Harness::from_settings(Settings::load()?)?;
//! let outcome = harness.forecast("ftsfr_treas_sf_basis", "auto_ets")?;
//! println!("MASE {:.3}", outcome.row().mase);
//! # Ok::<(), ftsfr_forecast::ForecastError>(())
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod driver;
pub mod error;
pub mod factory;
pub mod frequency;
pub mod latex;
pub mod metrics;
pub mod preprocess;
pub mod registry;
pub mod results;
pub mod statistics;
pub mod telemetry;

// Re-export commonly used types
pub use crate::config::Settings;
pub use crate::data::{DataLoader, Panel};
pub use crate::driver::{Harness, RunOutcome};
pub use crate::error::{ForecastError, Result};
pub use crate::frequency::Frequency;
pub use crate::preprocess::{PreparedPanel, Preprocessor, QualityRequirements};
pub use crate::registry::{DatasetCatalog, DatasetSpec, ModelCatalog, ModelSpec};
pub use crate::results::{MetricRow, SkipCheck};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
