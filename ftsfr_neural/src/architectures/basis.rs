//! Doubly residual stacks of basis blocks: NBEATS (generic basis) and NHiTS
//! (input pooling with interpolated multi-rate forecasts)

use super::point_network;
use crate::layers::{Mlp, Param};
use ndarray::{s, Array2};
use rand::rngs::StdRng;

/// `knots x horizon` linear interpolation, aligned at both ends
fn interpolation_matrix(knots: usize, horizon: usize) -> Array2<f64> {
    let mut m = Array2::zeros((knots, horizon));
    if knots == horizon {
        m.diag_mut().fill(1.0);
        return m;
    }
    for j in 0..horizon {
        let pos = if horizon > 1 {
            j as f64 * (knots - 1) as f64 / (horizon - 1) as f64
        } else {
            0.0
        };
        let lo = (pos.floor() as usize).min(knots - 1);
        let hi = (lo + 1).min(knots - 1);
        let w = pos - lo as f64;
        m[[lo, j]] += 1.0 - w;
        m[[hi, j]] += w;
    }
    m
}

#[derive(Debug, Clone)]
struct BasisBlock {
    input_size: usize,
    pool: usize,
    mlp: Mlp,
    interpolation: Array2<f64>,
    argmax: Vec<usize>,
}

impl BasisBlock {
    fn new(
        input_size: usize,
        horizon: usize,
        hidden: usize,
        pool: usize,
        knots: usize,
        rng: &mut StdRng,
    ) -> Self {
        let pool = pool.max(1);
        let pooled = input_size.div_ceil(pool);
        let knots = knots.clamp(1, horizon);
        Self {
            input_size,
            pool,
            mlp: Mlp::new(&[pooled, hidden, hidden, input_size + knots], rng),
            interpolation: interpolation_matrix(knots, horizon),
            argmax: Vec::new(),
        }
    }

    /// Max-pool each row with ceil mode, remembering the winning positions
    fn pool_input(&mut self, r: &Array2<f64>) -> Array2<f64> {
        let pooled = self.input_size.div_ceil(self.pool);
        let mut out = Array2::zeros((r.nrows(), pooled));
        self.argmax = vec![0; r.nrows() * pooled];
        for (b, row) in r.rows().into_iter().enumerate() {
            for p in 0..pooled {
                let start = p * self.pool;
                let stop = (start + self.pool).min(self.input_size);
                let mut best = start;
                for i in start..stop {
                    if row[i] > row[best] {
                        best = i;
                    }
                }
                out[[b, p]] = row[best];
                self.argmax[b * pooled + p] = best;
            }
        }
        out
    }

    fn forward(&mut self, r: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let pooled = self.pool_input(r);
        let out = self.mlp.forward(&pooled);
        let backcast = out.slice(s![.., ..self.input_size]).to_owned();
        let forecast = out
            .slice(s![.., self.input_size..])
            .dot(&self.interpolation);
        (backcast, forecast)
    }

    fn backward(&mut self, d_backcast: &Array2<f64>, d_forecast: &Array2<f64>) -> Array2<f64> {
        let batch = d_backcast.nrows();
        let knots = self.interpolation.nrows();
        let mut d_out = Array2::zeros((batch, self.input_size + knots));
        d_out
            .slice_mut(s![.., ..self.input_size])
            .assign(d_backcast);
        d_out
            .slice_mut(s![.., self.input_size..])
            .assign(&d_forecast.dot(&self.interpolation.t()));

        let d_pooled = self.mlp.backward(&d_out);
        let pooled = d_pooled.ncols();
        let mut d_r = Array2::zeros((batch, self.input_size));
        for b in 0..batch {
            for p in 0..pooled {
                d_r[[b, self.argmax[b * pooled + p]]] += d_pooled[[b, p]];
            }
        }
        d_r
    }
}

/// Stack of basis blocks, each fitting the residual the previous left
#[derive(Debug, Clone)]
pub struct StackedBasis {
    blocks: Vec<BasisBlock>,
    horizon: usize,
}

impl StackedBasis {
    /// NBEATS with generic basis
    pub fn nbeats(
        input_size: usize,
        horizon: usize,
        hidden: usize,
        n_blocks: usize,
        rng: &mut StdRng,
    ) -> Self {
        let blocks = (0..n_blocks)
            .map(|_| BasisBlock::new(input_size, horizon, hidden, 1, horizon, rng))
            .collect();
        Self { blocks, horizon }
    }

    /// NHiTS; block `i` pools by `kernel >> i` and forecasts `horizon / (kernel >> i)` knots
    pub fn nhits(
        input_size: usize,
        horizon: usize,
        hidden: usize,
        n_blocks: usize,
        kernel: usize,
        rng: &mut StdRng,
    ) -> Self {
        let blocks = (0..n_blocks)
            .map(|i| {
                let rate = (kernel >> i).max(1);
                let knots = (horizon / rate).max(1);
                BasisBlock::new(input_size, horizon, hidden, rate, knots, rng)
            })
            .collect();
        Self { blocks, horizon }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let mut residual = x.clone();
        let mut total = Array2::zeros((x.nrows(), self.horizon));
        for block in self.blocks.iter_mut() {
            let (backcast, forecast) = block.forward(&residual);
            residual = residual - backcast;
            total += &forecast;
        }
        total
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        let input_size = self.blocks.first().map_or(0, |b| b.input_size);
        let mut d_residual = Array2::<f64>::zeros((grad.nrows(), input_size));
        for block in self.blocks.iter_mut().rev() {
            let d_input = block.backward(&d_residual.mapv(|v| -v), grad);
            d_residual = d_residual + d_input;
        }
    }

    fn params(&mut self) -> Vec<&mut Param> {
        self.blocks.iter_mut().flat_map(|b| b.mlp.params()).collect()
    }
}

point_network!(StackedBasis);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn interpolation_hits_knots_at_the_ends() {
        let m = interpolation_matrix(3, 5);
        let knots = array![[0.0, 10.0, 20.0]];
        let path = knots.dot(&m);
        assert_eq!(path, array![[0.0, 5.0, 10.0, 15.0, 20.0]]);
        assert_eq!(interpolation_matrix(4, 4), Array2::<f64>::eye(4));
    }

    #[test]
    fn pooling_routes_gradient_to_the_maximum() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut block = BasisBlock::new(5, 2, 4, 2, 1, &mut rng);
        let pooled = block.pool_input(&array![[1.0, 3.0, 2.0, 0.0, 7.0]]);
        assert_eq!(pooled, array![[3.0, 2.0, 7.0]]);
        assert_eq!(block.argmax, vec![1, 2, 4]);
    }

    #[test]
    fn stack_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut net = StackedBasis::nbeats(4, 2, 5, 2, &mut rng);
        let x = array![[0.2, -0.4, 0.9, 0.1]];

        let base = net.forward(&x).sum();
        net.backward(&Array2::ones((1, 2)));
        let analytic = net.blocks[0].mlp.params()[0].grad[[2, 1]];

        let eps = 1e-6;
        let mut bumped = net.clone();
        bumped.blocks[0].mlp.params()[0].value[[2, 1]] += eps;
        let numeric = (bumped.forward(&x).sum() - base) / eps;
        assert_relative_eq!(analytic, numeric, epsilon = 1e-4);
    }
}
