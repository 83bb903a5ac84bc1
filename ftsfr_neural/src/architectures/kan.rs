//! Kolmogorov-Arnold network
//!
//! Each edge carries a learnable univariate function: a SiLU term plus a
//! combination of Gaussian radial bases on a fixed grid over `[-2, 2]`.
//! A layer expands every input into those features and mixes them with one
//! linear map.

use super::point_network;
use crate::layers::{sigmoid, Dense, Param};
use ndarray::Array2;
use rand::rngs::StdRng;

const GRID_MIN: f64 = -2.0;
const GRID_MAX: f64 = 2.0;

#[derive(Debug, Clone)]
struct KanLayer {
    input_size: usize,
    centers: Vec<f64>,
    width: f64,
    mix: Dense,
    input: Array2<f64>,
    features: Array2<f64>,
}

impl KanLayer {
    fn new(input_size: usize, output_size: usize, grid_size: usize, rng: &mut StdRng) -> Self {
        let step = (GRID_MAX - GRID_MIN) / (grid_size - 1) as f64;
        let centers = (0..grid_size).map(|k| GRID_MIN + k as f64 * step).collect();
        Self {
            input_size,
            centers,
            width: step,
            mix: Dense::new(input_size * (grid_size + 1), output_size, rng),
            input: Array2::zeros((0, input_size)),
            features: Array2::zeros((0, 0)),
        }
    }

    fn per_input(&self) -> usize {
        self.centers.len() + 1
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let per = self.per_input();
        let mut features = Array2::zeros((x.nrows(), self.input_size * per));
        for ((b, i), &v) in x.indexed_iter() {
            let base = i * per;
            features[[b, base]] = v * sigmoid(v);
            for (k, c) in self.centers.iter().enumerate() {
                let z = (v - c) / self.width;
                features[[b, base + 1 + k]] = (-z * z).exp();
            }
        }
        self.input = x.clone();
        let out = self.mix.forward(&features);
        self.features = features;
        out
    }

    fn backward(&mut self, grad: &Array2<f64>) -> Array2<f64> {
        let per = self.per_input();
        let d_features = self.mix.backward(&self.features, grad);
        let mut dx = Array2::zeros(self.input.dim());
        for ((b, i), &v) in self.input.indexed_iter() {
            let base = i * per;
            let s = sigmoid(v);
            let mut d = d_features[[b, base]] * s * (1.0 + v * (1.0 - s));
            for (k, c) in self.centers.iter().enumerate() {
                let z = (v - c) / self.width;
                let phi = self.features[[b, base + 1 + k]];
                d += d_features[[b, base + 1 + k]] * phi * (-2.0 * z / self.width);
            }
            dx[[b, i]] = d;
        }
        dx
    }
}

#[derive(Debug, Clone)]
pub struct Kan {
    layers: Vec<KanLayer>,
}

impl Kan {
    pub fn new(
        input_size: usize,
        horizon: usize,
        hidden: usize,
        grid_size: usize,
        rng: &mut StdRng,
    ) -> Self {
        let grid_size = grid_size.max(2);
        Self {
            layers: vec![
                KanLayer::new(input_size, hidden, grid_size, rng),
                KanLayer::new(hidden, horizon, grid_size, rng),
            ],
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let mut h = x.clone();
        for layer in self.layers.iter_mut() {
            h = layer.forward(&h);
        }
        h
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        let mut g = grad.clone();
        for layer in self.layers.iter_mut().rev() {
            g = layer.backward(&g);
        }
    }

    fn params(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.mix.params()).collect()
    }
}

point_network!(Kan);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn input_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut layer = KanLayer::new(2, 3, 5, &mut rng);
        let x = array![[0.3, -1.1]];

        let base = layer.forward(&x).sum();
        let dx = layer.backward(&Array2::ones((1, 3)));

        let eps = 1e-6;
        let bumped = array![[0.3, -1.1 + eps]];
        let numeric = (layer.clone().forward(&bumped).sum() - base) / eps;
        assert_relative_eq!(dx[[0, 1]], numeric, epsilon = 1e-5);
    }

    #[test]
    fn grid_spans_the_fixed_range() {
        let mut rng = StdRng::seed_from_u64(6);
        let layer = KanLayer::new(1, 1, 5, &mut rng);
        assert_eq!(layer.centers, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(layer.per_input(), 6);
    }
}
