//! Hyperparameter search spaces and seeded random search

use crate::architectures::NeuralFamily;
use crate::scaler::ScalerType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One sampled configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub input_size: usize,
    pub learning_rate: f64,
    pub max_steps: usize,
    pub batch_size: usize,
    pub hidden_size: usize,
    /// Stacked blocks (NBEATS, NHiTS) or layers (LSTM, KAN, TiDE)
    pub n_blocks: usize,
    /// Moving-average window (DLinear) or first pooling kernel (NHiTS)
    pub kernel_size: usize,
    /// Basis functions per edge (KAN)
    pub grid_size: usize,
    pub scaler_type: ScalerType,
    pub start_padding_enabled: bool,
    pub random_seed: u64,
}

impl HyperParams {
    /// A reasonable fixed configuration for `horizon`
    pub fn defaults(horizon: usize) -> Self {
        Self {
            input_size: 2 * horizon,
            learning_rate: 1e-3,
            max_steps: 500,
            batch_size: 32,
            hidden_size: 64,
            n_blocks: 2,
            kernel_size: 25,
            grid_size: 8,
            scaler_type: ScalerType::Robust,
            start_padding_enabled: true,
            random_seed: 1,
        }
    }
}

/// Discrete and log-uniform choices for every tuned hyperparameter
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    /// `input_size` is drawn as a multiple of the horizon
    pub input_size_multipliers: Vec<usize>,
    /// Log-uniform bounds
    pub learning_rate: (f64, f64),
    pub max_steps: Vec<usize>,
    pub batch_size: Vec<usize>,
    pub hidden_size: Vec<usize>,
    pub n_blocks: Vec<usize>,
    pub kernel_size: Vec<usize>,
    pub grid_size: Vec<usize>,
    pub scaler_type: Vec<ScalerType>,
    /// Inclusive range of random seeds
    pub random_seed: (u64, u64),
}

impl SearchSpace {
    pub fn for_family(family: NeuralFamily) -> Self {
        let base = SearchSpace {
            input_size_multipliers: vec![1, 2, 3, 4, 5],
            learning_rate: (1e-4, 1e-1),
            max_steps: vec![500, 1000],
            batch_size: vec![32, 64, 128, 256],
            hidden_size: vec![64],
            n_blocks: vec![2],
            kernel_size: vec![25],
            grid_size: vec![8],
            scaler_type: vec![ScalerType::Robust],
            random_seed: (1, 20),
        };
        match family {
            NeuralFamily::NLinear => SearchSpace {
                scaler_type: vec![ScalerType::Robust, ScalerType::Standard],
                ..base
            },
            NeuralFamily::DLinear => SearchSpace {
                kernel_size: vec![11, 25, 51],
                scaler_type: vec![ScalerType::Robust, ScalerType::Standard],
                ..base
            },
            NeuralFamily::Nbeats => SearchSpace {
                hidden_size: vec![64, 128, 256],
                n_blocks: vec![2, 3],
                ..base
            },
            NeuralFamily::Nhits => SearchSpace {
                hidden_size: vec![64, 128, 256],
                n_blocks: vec![3],
                kernel_size: vec![2, 4, 8],
                ..base
            },
            NeuralFamily::Tide => SearchSpace {
                hidden_size: vec![64, 128, 256],
                n_blocks: vec![1, 2],
                ..base
            },
            NeuralFamily::Kan => SearchSpace {
                hidden_size: vec![16, 32, 64],
                grid_size: vec![5, 8, 10],
                ..base
            },
            NeuralFamily::Lstm => SearchSpace {
                hidden_size: vec![32, 64, 128],
                max_steps: vec![250, 500],
                ..base
            },
            NeuralFamily::DeepAr => SearchSpace {
                hidden_size: vec![16, 32, 64],
                max_steps: vec![250, 500],
                batch_size: vec![32, 64],
                ..base
            },
            NeuralFamily::VanillaTransformer => SearchSpace {
                input_size_multipliers: vec![1, 2, 3],
                hidden_size: vec![16, 32],
                max_steps: vec![250, 500],
                batch_size: vec![16, 32, 64],
                ..base
            },
        }
    }

    pub fn sample(&self, horizon: usize, rng: &mut StdRng) -> HyperParams {
        let defaults = HyperParams::defaults(horizon);
        let pick = |choices: &[usize], rng: &mut StdRng, default: usize| {
            choices.choose(rng).copied().unwrap_or(default)
        };

        let multiplier = pick(&self.input_size_multipliers, rng, 2);
        let (lo, hi) = self.learning_rate;
        let learning_rate = rng.gen_range(lo.ln()..=hi.ln()).exp().clamp(lo, hi);

        HyperParams {
            input_size: (multiplier * horizon).max(1),
            learning_rate,
            max_steps: pick(&self.max_steps, rng, defaults.max_steps),
            batch_size: pick(&self.batch_size, rng, defaults.batch_size),
            hidden_size: pick(&self.hidden_size, rng, defaults.hidden_size),
            n_blocks: pick(&self.n_blocks, rng, defaults.n_blocks),
            kernel_size: pick(&self.kernel_size, rng, defaults.kernel_size),
            grid_size: pick(&self.grid_size, rng, defaults.grid_size),
            scaler_type: self
                .scaler_type
                .choose(rng)
                .copied()
                .unwrap_or(defaults.scaler_type),
            start_padding_enabled: true,
            random_seed: rng.gen_range(self.random_seed.0..=self.random_seed.1),
        }
    }
}

/// Seeded random search over a space; yields `num_samples` configurations
#[derive(Debug, Clone)]
pub struct RandomSearch {
    pub space: SearchSpace,
    pub num_samples: usize,
    pub seed: u64,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, num_samples: usize, seed: u64) -> Self {
        Self {
            space,
            num_samples,
            seed,
        }
    }

    pub fn configurations(&self, horizon: usize) -> Vec<HyperParams> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.num_samples)
            .map(|_| self.space.sample(horizon, &mut rng))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NeuralFamily::DeepAr)]
    #[case(NeuralFamily::Nbeats)]
    #[case(NeuralFamily::Nhits)]
    #[case(NeuralFamily::DLinear)]
    #[case(NeuralFamily::NLinear)]
    #[case(NeuralFamily::VanillaTransformer)]
    #[case(NeuralFamily::Tide)]
    #[case(NeuralFamily::Kan)]
    #[case(NeuralFamily::Lstm)]
    fn samples_stay_inside_the_space(#[case] family: NeuralFamily) {
        let space = SearchSpace::for_family(family);
        let configs = RandomSearch::new(space.clone(), 25, 3).configurations(12);
        assert_eq!(configs.len(), 25);
        for hp in configs {
            assert_eq!(hp.input_size % 12, 0);
            assert!(space.input_size_multipliers.contains(&(hp.input_size / 12)));
            assert!(hp.learning_rate >= 1e-4 && hp.learning_rate <= 1e-1);
            assert!((1..=20).contains(&hp.random_seed));
            assert!(space.hidden_size.contains(&hp.hidden_size));
            assert!(hp.start_padding_enabled);
        }
    }

    #[test]
    fn search_is_reproducible() {
        let space = SearchSpace::for_family(NeuralFamily::Nhits);
        let a = RandomSearch::new(space.clone(), 4, 7).configurations(36);
        let b = RandomSearch::new(space, 4, 7).configurations(36);
        assert_eq!(a, b);
    }
}
