//! Auto models: random hyperparameter search, then a refit of the best
//! configuration
//!
//! Each trial trains on every series minus its last `horizon` values and is
//! scored by the MAE on those values. The winning configuration is retrained
//! on the full history before forecasting.

use crate::architectures::NeuralFamily;
use crate::device::Accelerator;
use crate::error::{NeuralError, Result};
use crate::logs::{SearchLogger, TrialResult};
use crate::search::{HyperParams, RandomSearch, SearchSpace};
use crate::trainer::{train, TrainedNetwork};
use ftsfr_math::transform::fill_missing;
use ftsfr_models::{ForecastRow, ForecastTable, SeriesFrame};
use std::path::PathBuf;
use tracing::{info, warn};

/// Search budget and run options
#[derive(Debug, Clone)]
pub struct AutoConfig {
    /// Number of sampled configurations
    pub num_samples: usize,
    pub search_seed: u64,
    /// Overrides each configuration's `max_steps` with full passes
    pub n_epochs: Option<usize>,
    pub log_dir: Option<PathBuf>,
    pub accelerator: Accelerator,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            num_samples: 10,
            search_seed: 1,
            n_epochs: None,
            log_dir: None,
            accelerator: Accelerator::detect(),
        }
    }
}

/// A neural family wrapped with its hyperparameter search
#[derive(Debug)]
pub struct AutoNeural {
    family: NeuralFamily,
    horizon: usize,
    config: AutoConfig,
    space: SearchSpace,
    trials: Vec<TrialResult>,
    best: Option<TrainedNetwork>,
}

impl AutoNeural {
    pub fn new(family: NeuralFamily, horizon: usize, mut config: AutoConfig) -> Self {
        config.accelerator = config.accelerator.for_family(family.requires_cpu());
        Self {
            family,
            horizon,
            config,
            space: SearchSpace::for_family(family),
            trials: Vec::new(),
            best: None,
        }
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn family(&self) -> NeuralFamily {
        self.family
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn accelerator(&self) -> Accelerator {
        self.config.accelerator
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    /// Configuration chosen by the last `fit`
    pub fn best_params(&self) -> Option<&HyperParams> {
        self.best.as_ref().map(|b| &b.params)
    }

    /// Run the search on gap-free histories and refit the winner on them
    pub fn fit(&mut self, panel: &[Vec<f64>]) -> Result<()> {
        let h = self.horizon;
        let train_part: Vec<Vec<f64>> = panel
            .iter()
            .map(|v| v[..v.len().saturating_sub(h)].to_vec())
            .collect();
        let scored: Vec<usize> = (0..panel.len())
            .filter(|&s| panel[s].len() > h)
            .collect();
        if scored.is_empty() {
            return Err(NeuralError::InsufficientData(format!(
                "{}: every series is shorter than horizon + 1 = {}",
                self.family,
                h + 1
            )));
        }

        let logger = match &self.config.log_dir {
            Some(dir) => Some(SearchLogger::new(
                dir,
                self.family.model_name(),
                self.config.accelerator,
            )?),
            None => None,
        };

        let search = RandomSearch::new(
            self.space.clone(),
            self.config.num_samples.max(1),
            self.config.search_seed,
        );
        info!(
            model = %self.family,
            trials = search.num_samples,
            series = panel.len(),
            accelerator = %self.config.accelerator,
            "starting hyperparameter search"
        );

        self.trials.clear();
        self.best = None;
        for (trial, params) in search.configurations(h).into_iter().enumerate() {
            let (valid_loss, losses) = match train(self.family, &params, h, &train_part, self.config.n_epochs) {
                Ok((mut net, losses)) => {
                    let forecasts = net.predict(&train_part);
                    (validation_mae(panel, &forecasts, &scored, h), losses)
                }
                Err(err) => {
                    warn!(model = %self.family, trial, error = %err, "trial failed");
                    (None, Vec::new())
                }
            };
            let result = TrialResult {
                trial,
                valid_loss,
                params,
            };
            if let Some(logger) = &logger {
                logger.write_trial(&result, &losses)?;
            }
            self.trials.push(result);
        }
        if let Some(logger) = &logger {
            logger.write_search_results(&self.trials)?;
        }

        let best = self
            .trials
            .iter()
            .filter_map(|t| t.valid_loss.map(|loss| (loss, t)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(loss, t)| (loss, t.trial, t.params.clone()))
            .ok_or_else(|| {
                NeuralError::TrainingError(format!(
                    "{}: no trial produced a finite validation loss",
                    self.family
                ))
            })?;
        info!(
            model = %self.family,
            trial = best.1,
            valid_loss = best.0,
            input_size = best.2.input_size,
            learning_rate = best.2.learning_rate,
            "best configuration selected"
        );

        let (network, _) = train(self.family, &best.2, h, panel, self.config.n_epochs)?;
        self.best = Some(network);
        Ok(())
    }

    /// Forecast `horizon` values after the end of every series
    pub fn predict(&mut self, panel: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let family = self.family;
        let network = self
            .best
            .as_mut()
            .ok_or_else(|| NeuralError::NotFitted(family.to_string()))?;
        Ok(network.predict(panel))
    }

    /// One hold-out window of `horizon` slots at the end of every series:
    /// fit on the history before it, then forecast it
    pub fn cross_validation(&mut self, frames: &[SeriesFrame]) -> Result<ForecastTable> {
        let h = self.horizon;
        let mut kept = Vec::with_capacity(frames.len());
        let mut histories = Vec::with_capacity(frames.len());
        for frame in frames {
            if frame.len() < h + 1 {
                warn!(
                    series = %frame.unique_id,
                    length = frame.len(),
                    "series too short for cross-validation window, skipped"
                );
                continue;
            }
            match fill_missing(&frame.y[..frame.len() - h]) {
                Ok(history) => {
                    kept.push(frame);
                    histories.push(history);
                }
                Err(err) => warn!(series = %frame.unique_id, error = %err, "no usable history, skipped"),
            }
        }

        self.fit(&histories)?;
        let forecasts = self.predict(&histories)?;

        let mut table = ForecastTable::new(vec![self.family.column_name().to_string()]);
        for (frame, forecast) in kept.iter().zip(forecasts) {
            let cutoff = frame.len() - h - 1;
            for (step, value) in forecast.into_iter().enumerate() {
                let idx = cutoff + 1 + step;
                table.rows.push(ForecastRow {
                    unique_id: frame.unique_id.clone(),
                    ds: frame.ds[idx],
                    cutoff: frame.ds[cutoff],
                    y: frame.y[idx],
                    predictions: vec![Some(value)],
                });
            }
        }
        Ok(table)
    }
}

/// MAE of `forecasts` against the last `horizon` values of the scored series
fn validation_mae(
    panel: &[Vec<f64>],
    forecasts: &[Vec<f64>],
    scored: &[usize],
    horizon: usize,
) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0usize;
    for &s in scored {
        let actual = &panel[s][panel[s].len() - horizon..];
        for (a, f) in actual.iter().zip(&forecasts[s]) {
            total += (a - f).abs();
            count += 1;
        }
    }
    let mae = total / count.max(1) as f64;
    (count > 0 && mae.is_finite()).then_some(mae)
}
