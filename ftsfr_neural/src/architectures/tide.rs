//! TiDE: dense encoder and decoder made of residual MLP blocks, plus a
//! global linear skip from the lookback window to the horizon

use super::point_network;
use crate::layers::{Dense, Mlp, Param};
use ndarray::Array2;
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
struct ResidualBlock {
    mlp: Mlp,
    skip: Dense,
    input: Array2<f64>,
}

impl ResidualBlock {
    fn new(input_size: usize, hidden: usize, output_size: usize, rng: &mut StdRng) -> Self {
        Self {
            mlp: Mlp::new(&[input_size, hidden, output_size], rng),
            skip: Dense::new(input_size, output_size, rng),
            input: Array2::zeros((0, input_size)),
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        self.input = x.clone();
        self.mlp.forward(x) + self.skip.forward(x)
    }

    fn backward(&mut self, grad: &Array2<f64>) -> Array2<f64> {
        self.mlp.backward(grad) + self.skip.backward(&self.input, grad)
    }

    fn params(&mut self) -> Vec<&mut Param> {
        let mut params = self.mlp.params();
        params.extend(self.skip.params());
        params
    }
}

#[derive(Debug, Clone)]
pub struct Tide {
    encoder: Vec<ResidualBlock>,
    decoder: ResidualBlock,
    lookback_skip: Dense,
    input: Array2<f64>,
}

impl Tide {
    pub fn new(
        input_size: usize,
        horizon: usize,
        hidden: usize,
        n_layers: usize,
        rng: &mut StdRng,
    ) -> Self {
        let encoder = (0..n_layers.max(1))
            .map(|i| {
                let width = if i == 0 { input_size } else { hidden };
                ResidualBlock::new(width, hidden, hidden, rng)
            })
            .collect();
        Self {
            encoder,
            decoder: ResidualBlock::new(hidden, hidden, horizon, rng),
            lookback_skip: Dense::new(input_size, horizon, rng),
            input: Array2::zeros((0, input_size)),
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        self.input = x.clone();
        let mut h = x.clone();
        for block in self.encoder.iter_mut() {
            h = block.forward(&h);
        }
        self.decoder.forward(&h) + self.lookback_skip.forward(x)
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        self.lookback_skip.backward(&self.input, grad);
        let mut g = self.decoder.backward(grad);
        for block in self.encoder.iter_mut().rev() {
            g = block.backward(&g);
        }
    }

    fn params(&mut self) -> Vec<&mut Param> {
        let mut params: Vec<&mut Param> = self
            .encoder
            .iter_mut()
            .flat_map(|b| b.params())
            .collect();
        params.extend(self.decoder.params());
        params.extend(self.lookback_skip.params());
        params
    }
}

point_network!(Tide);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architectures::Network;
    use crate::layers::Adam;
    use ndarray::Array2;
    use rand::SeedableRng;

    #[test]
    fn learns_to_repeat_the_last_value() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut net = Tide::new(4, 2, 16, 1, &mut rng);
        let mut adam = Adam::new(5e-3);
        let x = Array2::from_shape_fn((16, 4), |(r, c)| ((r * 4 + c) as f64 * 0.37).sin());
        let y = Array2::from_shape_fn((16, 2), |(r, _)| x[[r, 3]]);

        let before = net.train_step(&x, &y);
        adam.step(&mut net.params());
        let mut after = before;
        for _ in 0..400 {
            after = net.train_step(&x, &y);
            adam.step(&mut net.params());
        }
        assert!(after < before * 0.5, "{} -> {}", before, after);
    }
}
