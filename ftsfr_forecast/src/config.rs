//! Run settings
//!
//! Resolved in order: built-in defaults, `ftsfr.toml` in the working
//! directory, `FTSFR_*` variables, then the plain `OUTPUT_DIR`, `DATA_DIR`,
//! `N_EPOCHS` and `NUM_SAMPLES` variables. Command-line flags are applied on
//! top by the binaries.

use crate::error::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SETTINGS_FILE: &str = "ftsfr.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of `formatted/<module>/<dataset>.parquet`
    pub data_dir: PathBuf,
    /// Root of the `forecasting/` output tree
    pub output_dir: PathBuf,
    pub dataset_catalog: PathBuf,
    pub model_catalog: PathBuf,
    /// Full passes over the training windows, replacing sampled `max_steps`
    pub n_epochs: Option<usize>,
    /// Trials per neural search, replacing the catalog value
    pub num_samples: Option<usize>,
    /// Add historic-average and seasonal-naive columns to neural runs
    pub include_baselines: bool,
    pub search_seed: u64,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("_data"),
            output_dir: PathBuf::from("_output"),
            dataset_catalog: PathBuf::from("config/datasets.toml"),
            model_catalog: PathBuf::from("config/models.toml"),
            n_epochs: None,
            num_samples: None,
            include_baselines: true,
            search_seed: 1,
            debug: false,
        }
    }
}

impl Settings {
    /// Provider chain without command-line overrides
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(SETTINGS_FILE))
            .merge(Env::prefixed("FTSFR_"))
            .merge(Env::raw().only(&["OUTPUT_DIR", "DATA_DIR", "N_EPOCHS", "NUM_SAMPLES"]))
    }

    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    pub fn forecasting_dir(&self) -> PathBuf {
        self.output_dir.join("forecasting")
    }

    pub fn error_metrics_dir(&self) -> PathBuf {
        self.forecasting_dir().join("error_metrics")
    }

    /// `error_metrics/<dataset>/<model>.csv`
    pub fn result_path(&self, dataset: &str, model: &str) -> PathBuf {
        self.error_metrics_dir()
            .join(dataset)
            .join(format!("{}.csv", model))
    }

    pub fn logs_dir(&self, dataset: &str, model: &str) -> PathBuf {
        self.forecasting_dir().join("logs").join(dataset).join(model)
    }

    pub fn paper_dir(&self) -> PathBuf {
        self.forecasting_dir().join("paper")
    }
}
