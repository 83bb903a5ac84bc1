//! # FTSFR Neural
//!
//! Neural forecasting backend: global models trained on windows drawn from
//! every series of a panel, each wrapped in a seeded random hyperparameter
//! search.
//!
//! ## Features
//!
//! - Dense, LSTM and self-attention layers with hand-written gradients
//! - Adam with gradient clipping, robust per-window scaling
//! - NLinear, DLinear, NBEATS, NHiTS, TiDE, KAN, LSTM, DeepAR and an
//!   encoder-only transformer
//! - Per-family search spaces, trial logs, validation on the last horizon
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ftsfr_neural::{AutoConfig, AutoNeural, NeuralFamily};
//!
//! let panel: Vec<Vec<f64>> = (0..4)
//!     .map(|k| (0..80).map(|i| k as f64 + (i as f64 * 0.5).sin()).collect())
//!     .collect();
//! let config = AutoConfig { num_samples: 2, ..AutoConfig::default() };
//! let mut model = AutoNeural::new(NeuralFamily::Nhits, 12, config);
//! model.fit(&panel).unwrap();
//! let forecasts = model.predict(&panel).unwrap();
//! assert_eq!(forecasts[0].len(), 12);
//! ```

pub mod architectures;
pub mod attention;
pub mod auto;
pub mod device;
pub mod error;
pub mod layers;
pub mod logs;
pub mod lstm;
pub mod scaler;
pub mod search;
pub mod trainer;
pub mod windows;

// Re-export commonly used types
pub use crate::architectures::{NeuralFamily, Network};
pub use crate::auto::{AutoConfig, AutoNeural};
pub use crate::device::Accelerator;
pub use crate::error::{NeuralError, Result};
pub use crate::logs::TrialResult;
pub use crate::scaler::ScalerType;
pub use crate::search::{HyperParams, RandomSearch, SearchSpace};
