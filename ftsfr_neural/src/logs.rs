//! On-disk logs of a hyperparameter search
//!
//! ```text
//! <dir>/trial_<k>/metrics.csv    step, train_loss
//! <dir>/trial_<k>/hparams.json   sampled configuration and validation loss
//! <dir>/search_results.csv       one row per trial
//! ```

use crate::device::Accelerator;
use crate::error::Result;
use crate::scaler::ScalerType;
use crate::search::HyperParams;
use crate::trainer::LossRecord;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Outcome of one trial of the search
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub trial: usize,
    /// Validation MAE; `None` when the trial failed
    pub valid_loss: Option<f64>,
    pub params: HyperParams,
}

#[derive(Debug, Serialize)]
struct TrialHparams<'a> {
    model: &'a str,
    trial: usize,
    accelerator: Accelerator,
    valid_loss: Option<f64>,
    #[serde(flatten)]
    params: &'a HyperParams,
}

/// Flat row of `search_results.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub trial: usize,
    pub valid_loss: Option<f64>,
    pub input_size: usize,
    pub learning_rate: f64,
    pub max_steps: usize,
    pub batch_size: usize,
    pub hidden_size: usize,
    pub n_blocks: usize,
    pub kernel_size: usize,
    pub grid_size: usize,
    pub scaler_type: ScalerType,
    pub random_seed: u64,
}

impl From<&TrialResult> for SearchRecord {
    fn from(t: &TrialResult) -> Self {
        let p = &t.params;
        Self {
            trial: t.trial,
            valid_loss: t.valid_loss,
            input_size: p.input_size,
            learning_rate: p.learning_rate,
            max_steps: p.max_steps,
            batch_size: p.batch_size,
            hidden_size: p.hidden_size,
            n_blocks: p.n_blocks,
            kernel_size: p.kernel_size,
            grid_size: p.grid_size,
            scaler_type: p.scaler_type,
            random_seed: p.random_seed,
        }
    }
}

/// Writes the logs of one search run under a directory
#[derive(Debug, Clone)]
pub struct SearchLogger {
    dir: PathBuf,
    model: String,
    accelerator: Accelerator,
}

impl SearchLogger {
    pub fn new(dir: impl Into<PathBuf>, model: &str, accelerator: Accelerator) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            model: model.to_string(),
            accelerator,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trial_dir(&self, trial: usize) -> PathBuf {
        self.dir.join(format!("trial_{}", trial))
    }

    pub fn write_trial(&self, result: &TrialResult, losses: &[LossRecord]) -> Result<()> {
        let dir = self.trial_dir(result.trial);
        fs::create_dir_all(&dir)?;

        let mut writer = csv::Writer::from_path(dir.join("metrics.csv"))?;
        for record in losses {
            writer.serialize(record)?;
        }
        writer.flush()?;

        let hparams = TrialHparams {
            model: &self.model,
            trial: result.trial,
            accelerator: self.accelerator,
            valid_loss: result.valid_loss,
            params: &result.params,
        };
        let file = File::create(dir.join("hparams.json"))?;
        serde_json::to_writer_pretty(file, &hparams)?;
        Ok(())
    }

    pub fn write_search_results(&self, results: &[TrialResult]) -> Result<()> {
        let mut writer = csv::Writer::from_path(self.dir.join("search_results.csv"))?;
        for result in results {
            writer.serialize(SearchRecord::from(result))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_trial_and_search_files() {
        let tmp = tempdir().unwrap();
        let logger = SearchLogger::new(tmp.path().join("auto_nlinear"), "auto_nlinear", Accelerator::Cpu)
            .unwrap();
        let result = TrialResult {
            trial: 0,
            valid_loss: Some(0.25),
            params: HyperParams::defaults(3),
        };
        let losses = vec![LossRecord {
            step: 10,
            train_loss: 0.5,
        }];
        logger.write_trial(&result, &losses).unwrap();
        logger.write_search_results(&[result.clone()]).unwrap();

        let trial_dir = logger.trial_dir(0);
        let metrics = fs::read_to_string(trial_dir.join("metrics.csv")).unwrap();
        assert_eq!(metrics, "step,train_loss\n10,0.5\n");

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(trial_dir.join("hparams.json")).unwrap())
                .unwrap();
        assert_eq!(json["model"], "auto_nlinear");
        assert_eq!(json["accelerator"], "cpu");
        assert_eq!(json["input_size"], 6);
        assert_eq!(json["scaler_type"], "robust");

        let mut reader = csv::Reader::from_path(logger.dir().join("search_results.csv")).unwrap();
        let rows: Vec<SearchRecord> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows, vec![SearchRecord::from(&result)]);
    }
}
