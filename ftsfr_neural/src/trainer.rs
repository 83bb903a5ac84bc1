//! Mini-batch training of one configuration on a panel

use crate::architectures::{NeuralFamily, Network};
use crate::error::{NeuralError, Result};
use crate::layers::Adam;
use crate::search::HyperParams;
use crate::windows::{make_batch, WindowSampler};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Training loss is averaged and recorded every this many steps
pub const LOG_EVERY: usize = 10;

const PREDICT_CHUNK: usize = 256;

/// One row of a trial's `metrics.csv`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    pub step: usize,
    pub train_loss: f64,
}

/// A network trained with a fixed configuration
pub struct TrainedNetwork {
    pub family: NeuralFamily,
    pub params: HyperParams,
    pub horizon: usize,
    pub max_steps: usize,
    network: Box<dyn Network>,
    sampler: WindowSampler,
}

impl std::fmt::Debug for TrainedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedNetwork")
            .field("family", &self.family)
            .field("params", &self.params)
            .field("horizon", &self.horizon)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Step budget: `n_epochs` full passes over the windows when given,
/// otherwise the configuration's `max_steps`
pub fn step_budget(
    hp: &HyperParams,
    n_windows: usize,
    n_epochs: Option<usize>,
) -> usize {
    let per_epoch = n_windows.div_ceil(hp.batch_size.max(1));
    n_epochs
        .map(|epochs| epochs * per_epoch)
        .unwrap_or(hp.max_steps)
        .max(1)
}

/// Train `family` with `hp` on every complete window of `panel`
pub fn train(
    family: NeuralFamily,
    hp: &HyperParams,
    horizon: usize,
    panel: &[Vec<f64>],
    n_epochs: Option<usize>,
) -> Result<(TrainedNetwork, Vec<LossRecord>)> {
    let sampler = WindowSampler::new(hp.input_size, horizon, hp.start_padding_enabled);
    let positions = sampler.positions(panel);
    if positions.is_empty() {
        return Err(NeuralError::InsufficientData(format!(
            "{}: no training window with input_size={} and horizon={}",
            family, hp.input_size, horizon
        )));
    }

    let max_steps = step_budget(hp, positions.len(), n_epochs);
    let batch_size = hp.batch_size.max(1);
    let mut network = family.build(hp, horizon)?;
    let mut optimizer = Adam::new(hp.learning_rate);
    let mut rng = StdRng::seed_from_u64(hp.random_seed);

    let mut losses = Vec::with_capacity(max_steps / LOG_EVERY + 1);
    let mut running = 0.0;
    let mut counted = 0;
    for step in 1..=max_steps {
        let windows = sampler.sample(panel, &positions, batch_size, &mut rng);
        let batch = make_batch(&windows, hp.scaler_type, horizon);
        let loss = network.train_step(&batch.x, &batch.y);
        if !loss.is_finite() {
            return Err(NeuralError::TrainingError(format!(
                "{} diverged at step {} (learning_rate={:.2e})",
                family, step, hp.learning_rate
            )));
        }
        optimizer.step(&mut network.params());

        running += loss;
        counted += 1;
        if step % LOG_EVERY == 0 || step == max_steps {
            losses.push(LossRecord {
                step,
                train_loss: running / counted as f64,
            });
            running = 0.0;
            counted = 0;
        }
    }
    debug!(
        model = %family,
        steps = max_steps,
        windows = positions.len(),
        final_loss = losses.last().map_or(f64::NAN, |l| l.train_loss),
        "training finished"
    );

    Ok((
        TrainedNetwork {
            family,
            params: hp.clone(),
            horizon,
            max_steps,
            network,
            sampler,
        },
        losses,
    ))
}

impl TrainedNetwork {
    /// Forecast `horizon` values after the end of every series
    pub fn predict(&mut self, panel: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let mut forecasts = Vec::with_capacity(panel.len());
        for chunk in panel.chunks(PREDICT_CHUNK) {
            let windows: Vec<_> = chunk.iter().map(|v| self.sampler.context(v)).collect();
            let batch = make_batch(&windows, self.params.scaler_type, self.horizon);
            let out = self.network.predict(&batch.x);
            for (row, scale) in out.rows().into_iter().zip(&batch.scales) {
                forecasts.push(row.iter().map(|v| scale.inverse(*v)).collect());
            }
        }
        forecasts
    }
}
