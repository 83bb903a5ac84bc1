//! Forecasting networks
//!
//! Every network maps a scaled `batch x input_size` window to a
//! `batch x horizon` point forecast. Point networks train on MAE; DeepAR
//! trains on the Gaussian negative log-likelihood and forecasts its mean.

mod basis;
mod kan;
mod linear;
mod recurrent;
mod tide;
mod transformer;

pub use basis::StackedBasis;
pub use kan::Kan;
pub use linear::{DLinear, NLinear};
pub use recurrent::{DeepAr, LstmForecaster};
pub use tide::Tide;
pub use transformer::VanillaTransformer;

use crate::error::{NeuralError, Result};
use crate::layers::Param;
use crate::search::HyperParams;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trainable forecasting network
pub trait Network: Send {
    /// Point forecasts for a scaled batch
    fn predict(&mut self, x: &Array2<f64>) -> Array2<f64>;

    /// Accumulate gradients for one scaled batch and return its loss
    fn train_step(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> f64;

    fn params(&mut self) -> Vec<&mut Param>;
}

/// Mean absolute error and its gradient with respect to `pred`
pub fn mae_loss(pred: &Array2<f64>, target: &Array2<f64>) -> (f64, Array2<f64>) {
    let n = pred.len().max(1) as f64;
    let diff = pred - target;
    let loss = diff.iter().map(|d| d.abs()).sum::<f64>() / n;
    let grad = diff.mapv(|d| {
        if d > 0.0 {
            1.0 / n
        } else if d < 0.0 {
            -1.0 / n
        } else {
            0.0
        }
    });
    (loss, grad)
}

/// Implements [`Network`] for a type with inherent `forward`, `backward` and
/// `params`, training on MAE
macro_rules! point_network {
    ($ty:ty) => {
        impl $crate::architectures::Network for $ty {
            fn predict(&mut self, x: &ndarray::Array2<f64>) -> ndarray::Array2<f64> {
                self.forward(x)
            }

            fn train_step(&mut self, x: &ndarray::Array2<f64>, y: &ndarray::Array2<f64>) -> f64 {
                let out = self.forward(x);
                let (loss, grad) = $crate::architectures::mae_loss(&out, y);
                self.backward(&grad);
                loss
            }

            fn params(&mut self) -> Vec<&mut $crate::layers::Param> {
                self.params()
            }
        }
    };
}
pub(crate) use point_network;

/// Neural model families available to the auto search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeuralFamily {
    DeepAr,
    Nbeats,
    Nhits,
    DLinear,
    NLinear,
    VanillaTransformer,
    Tide,
    Kan,
    Lstm,
}

impl NeuralFamily {
    pub const ALL: [NeuralFamily; 9] = [
        NeuralFamily::DeepAr,
        NeuralFamily::Nbeats,
        NeuralFamily::Nhits,
        NeuralFamily::DLinear,
        NeuralFamily::NLinear,
        NeuralFamily::VanillaTransformer,
        NeuralFamily::Tide,
        NeuralFamily::Kan,
        NeuralFamily::Lstm,
    ];

    /// Symbolic model name, e.g. `auto_nhits`
    pub fn model_name(&self) -> &'static str {
        match self {
            NeuralFamily::DeepAr => "auto_deepar",
            NeuralFamily::Nbeats => "auto_nbeats",
            NeuralFamily::Nhits => "auto_nhits",
            NeuralFamily::DLinear => "auto_dlinear",
            NeuralFamily::NLinear => "auto_nlinear",
            NeuralFamily::VanillaTransformer => "auto_vanilla_transformer",
            NeuralFamily::Tide => "auto_tide",
            NeuralFamily::Kan => "auto_kan",
            NeuralFamily::Lstm => "auto_lstm",
        }
    }

    /// Column name in forecast tables
    pub fn column_name(&self) -> &'static str {
        match self {
            NeuralFamily::DeepAr => "AutoDeepAR",
            NeuralFamily::Nbeats => "AutoNBEATS",
            NeuralFamily::Nhits => "AutoNHITS",
            NeuralFamily::DLinear => "AutoDLinear",
            NeuralFamily::NLinear => "AutoNLinear",
            NeuralFamily::VanillaTransformer => "AutoVanillaTransformer",
            NeuralFamily::Tide => "AutoTiDE",
            NeuralFamily::Kan => "AutoKAN",
            NeuralFamily::Lstm => "AutoLSTM",
        }
    }

    /// Families whose probabilistic output head needs host execution
    pub fn requires_cpu(&self) -> bool {
        matches!(self, NeuralFamily::DeepAr)
    }

    /// Build an untrained network for a configuration
    pub fn build(&self, hp: &HyperParams, horizon: usize) -> Result<Box<dyn Network>> {
        if hp.input_size == 0 || horizon == 0 || hp.hidden_size == 0 {
            return Err(NeuralError::InvalidParameter(format!(
                "{}: input_size, horizon and hidden_size must be positive",
                self.model_name()
            )));
        }
        let mut rng = StdRng::seed_from_u64(hp.random_seed);
        let l = hp.input_size;
        let hidden = hp.hidden_size;
        let depth = hp.n_blocks.max(1);

        Ok(match self {
            NeuralFamily::NLinear => Box::new(NLinear::new(l, horizon, &mut rng)),
            NeuralFamily::DLinear => {
                Box::new(DLinear::new(l, horizon, hp.kernel_size, &mut rng))
            }
            NeuralFamily::Nbeats => Box::new(StackedBasis::nbeats(
                l, horizon, hidden, depth, &mut rng,
            )),
            NeuralFamily::Nhits => Box::new(StackedBasis::nhits(
                l,
                horizon,
                hidden,
                depth,
                hp.kernel_size,
                &mut rng,
            )),
            NeuralFamily::Tide => Box::new(Tide::new(l, horizon, hidden, depth, &mut rng)),
            NeuralFamily::Kan => {
                Box::new(Kan::new(l, horizon, hidden, hp.grid_size.max(2), &mut rng))
            }
            NeuralFamily::Lstm => Box::new(LstmForecaster::new(horizon, hidden, &mut rng)),
            NeuralFamily::DeepAr => Box::new(DeepAr::new(horizon, hidden, &mut rng)),
            NeuralFamily::VanillaTransformer => {
                Box::new(VanillaTransformer::new(l, horizon, hidden, &mut rng))
            }
        })
    }
}

impl fmt::Display for NeuralFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

impl FromStr for NeuralFamily {
    type Err = NeuralError;

    fn from_str(s: &str) -> Result<Self> {
        NeuralFamily::ALL
            .iter()
            .copied()
            .find(|f| f.model_name() == s)
            .ok_or_else(|| NeuralError::InvalidParameter(format!("unknown neural model '{}'", s)))
    }
}
