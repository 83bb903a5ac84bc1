//! Linear baselines: NLinear and DLinear

use super::point_network;
use crate::layers::{Dense, Param};
use ndarray::{s, Array2};
use rand::rngs::StdRng;

/// One linear map applied to the window after subtracting its last value
#[derive(Debug, Clone)]
pub struct NLinear {
    linear: Dense,
    shifted: Array2<f64>,
}

impl NLinear {
    pub fn new(input_size: usize, horizon: usize, rng: &mut StdRng) -> Self {
        Self {
            linear: Dense::new(input_size, horizon, rng),
            shifted: Array2::zeros((0, input_size)),
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let last = x.slice(s![.., -1..]).to_owned();
        self.shifted = x - &last;
        self.linear.forward(&self.shifted) + &last
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        self.linear.backward(&self.shifted, grad);
    }

    fn params(&mut self) -> Vec<&mut Param> {
        self.linear.params()
    }
}

point_network!(NLinear);

/// `x T` is the moving average of each window with edge replication
fn moving_average_matrix(input_size: usize, kernel: usize) -> Array2<f64> {
    let kernel = kernel.clamp(1, input_size.max(1));
    let front = (kernel - 1) / 2;
    let weight = 1.0 / kernel as f64;
    let mut t = Array2::zeros((input_size, input_size));
    for i in 0..input_size {
        for k in 0..kernel {
            let j = (i + k).saturating_sub(front).min(input_size - 1);
            t[[j, i]] += weight;
        }
    }
    t
}

/// Separate linear maps for the moving-average trend and the remainder
#[derive(Debug, Clone)]
pub struct DLinear {
    trend_map: Array2<f64>,
    trend: Dense,
    seasonal: Dense,
    trend_input: Array2<f64>,
    seasonal_input: Array2<f64>,
}

impl DLinear {
    pub fn new(input_size: usize, horizon: usize, kernel: usize, rng: &mut StdRng) -> Self {
        Self {
            trend_map: moving_average_matrix(input_size, kernel),
            trend: Dense::new(input_size, horizon, rng),
            seasonal: Dense::new(input_size, horizon, rng),
            trend_input: Array2::zeros((0, input_size)),
            seasonal_input: Array2::zeros((0, input_size)),
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        self.trend_input = x.dot(&self.trend_map);
        self.seasonal_input = x - &self.trend_input;
        self.trend.forward(&self.trend_input) + self.seasonal.forward(&self.seasonal_input)
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        self.trend.backward(&self.trend_input, grad);
        self.seasonal.backward(&self.seasonal_input, grad);
    }

    fn params(&mut self) -> Vec<&mut Param> {
        let mut params = self.trend.params();
        params.extend(self.seasonal.params());
        params
    }
}

point_network!(DLinear);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architectures::Network;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn moving_average_replicates_edges() {
        let t = moving_average_matrix(4, 3);
        let x = array![[1.0, 2.0, 3.0, 10.0]];
        let trend = x.dot(&t);
        assert_relative_eq!(trend[[0, 0]], (1.0 + 1.0 + 2.0) / 3.0);
        assert_relative_eq!(trend[[0, 1]], 2.0);
        assert_relative_eq!(trend[[0, 3]], (3.0 + 10.0 + 10.0) / 3.0);
        for col in t.columns() {
            assert_relative_eq!(col.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn nlinear_is_shift_equivariant() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut net = NLinear::new(3, 2, &mut rng);
        let x = array![[1.0, 2.0, 3.0]];
        let shifted = &x + 5.0;
        let a = net.predict(&x);
        let b = net.predict(&shifted);
        for (p, q) in a.iter().zip(b.iter()) {
            assert_relative_eq!(q - p, 5.0, epsilon = 1e-12);
        }
    }
}
