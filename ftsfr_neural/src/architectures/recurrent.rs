//! Recurrent forecasters: an LSTM encoder with a dense multi-step head, and
//! DeepAR (autoregressive LSTM with a Gaussian output)

use super::{point_network, Network};
use crate::layers::{softplus, sigmoid, Dense, Param};
use crate::lstm::Lstm;
use ndarray::{s, Array2};
use rand::rngs::StdRng;

const MIN_SIGMA: f64 = 1e-3;

fn column(x: &Array2<f64>, t: usize) -> Array2<f64> {
    x.slice(s![.., t..t + 1]).to_owned()
}

/// LSTM over the window; the last hidden state maps to all horizon steps
#[derive(Debug, Clone)]
pub struct LstmForecaster {
    lstm: Lstm,
    head: Dense,
    last_hidden: Array2<f64>,
    steps: usize,
}

impl LstmForecaster {
    pub fn new(horizon: usize, hidden: usize, rng: &mut StdRng) -> Self {
        Self {
            lstm: Lstm::new(1, hidden, rng),
            head: Dense::new(hidden, horizon, rng),
            last_hidden: Array2::zeros((0, hidden)),
            steps: 0,
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let xs: Vec<Array2<f64>> = (0..x.ncols()).map(|t| column(x, t)).collect();
        let hs = self.lstm.forward(&xs);
        self.steps = hs.len();
        self.last_hidden = hs
            .last()
            .cloned()
            .unwrap_or_else(|| Array2::zeros((x.nrows(), self.lstm.hidden_size)));
        self.head.forward(&self.last_hidden)
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        let d_hidden = self.head.backward(&self.last_hidden, grad);
        if self.steps == 0 {
            return;
        }
        let mut grads = vec![Array2::zeros(d_hidden.dim()); self.steps];
        grads[self.steps - 1] = d_hidden;
        self.lstm.backward(&grads);
    }

    fn params(&mut self) -> Vec<&mut Param> {
        let mut params = self.lstm.params();
        params.extend(self.head.params());
        params
    }
}

point_network!(LstmForecaster);

/// DeepAR: the LSTM reads the window one value at a time and emits the mean
/// and scale of a Gaussian for the next value. Training uses teacher forcing
/// over the horizon; forecasts roll the mean forward.
#[derive(Debug, Clone)]
pub struct DeepAr {
    lstm: Lstm,
    head: Dense,
    horizon: usize,
}

impl DeepAr {
    pub fn new(horizon: usize, hidden: usize, rng: &mut StdRng) -> Self {
        Self {
            lstm: Lstm::new(1, hidden, rng),
            head: Dense::new(hidden, 2, rng),
            horizon,
        }
    }

    /// Gaussian negative log-likelihood per element, up to the constant
    fn nll(mu: f64, sigma: f64, z: f64) -> f64 {
        let r = (z - mu) / sigma;
        sigma.ln() + 0.5 * r * r + 0.5 * (2.0 * std::f64::consts::PI).ln()
    }
}

impl Network for DeepAr {
    fn predict(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let batch = x.nrows();
        let hidden = self.lstm.hidden_size;
        let mut h = Array2::zeros((batch, hidden));
        let mut c = Array2::zeros((batch, hidden));
        for t in 0..x.ncols() {
            let (h_next, c_next) = self.lstm.step(&column(x, t), &h, &c);
            h = h_next;
            c = c_next;
        }

        let mut out = Array2::zeros((batch, self.horizon));
        for k in 0..self.horizon {
            let mu = self.head.forward(&h).slice(s![.., 0..1]).to_owned();
            out.slice_mut(s![.., k..k + 1]).assign(&mu);
            if k + 1 < self.horizon {
                let (h_next, c_next) = self.lstm.step(&mu, &h, &c);
                h = h_next;
                c = c_next;
            }
        }
        out
    }

    fn train_step(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let batch = x.nrows();
        let context = x.ncols();
        let horizon = y.ncols().min(self.horizon);
        if context == 0 || horizon == 0 {
            return 0.0;
        }

        // inputs s[0..L+H-1]; the output after reading s[t] describes s[t+1]
        let steps = context + horizon - 1;
        let xs: Vec<Array2<f64>> = (0..steps)
            .map(|t| {
                if t < context {
                    column(x, t)
                } else {
                    column(y, t - context)
                }
            })
            .collect();
        let hs = self.lstm.forward(&xs);

        let n = (batch * horizon) as f64;
        let mut loss = 0.0;
        let mut grads = vec![Array2::zeros((batch, self.lstm.hidden_size)); steps];
        for (k, t) in (context - 1..steps).enumerate() {
            let out = self.head.forward(&hs[t]);
            let mut d_out = Array2::zeros((batch, 2));
            for b in 0..batch {
                let mu = out[[b, 0]];
                let raw = out[[b, 1]];
                let sigma = softplus(raw) + MIN_SIGMA;
                let z = y[[b, k]];
                loss += Self::nll(mu, sigma, z);

                let r = z - mu;
                let d_mu = -r / (sigma * sigma);
                let d_sigma = 1.0 / sigma - r * r / (sigma * sigma * sigma);
                d_out[[b, 0]] = d_mu / n;
                d_out[[b, 1]] = d_sigma * sigmoid(raw) / n;
            }
            grads[t] = self.head.backward(&hs[t], &d_out);
        }
        self.lstm.backward(&grads);
        loss / n
    }

    fn params(&mut self) -> Vec<&mut Param> {
        let mut params = self.lstm.params();
        params.extend(self.head.params());
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Adam;
    use rand::SeedableRng;

    fn sine_batch(rows: usize, context: usize, horizon: usize) -> (Array2<f64>, Array2<f64>) {
        let value = |r: usize, t: usize| ((r + t) as f64 * 0.5).sin();
        let x = Array2::from_shape_fn((rows, context), |(r, t)| value(r, t));
        let y = Array2::from_shape_fn((rows, horizon), |(r, t)| value(r, context + t));
        (x, y)
    }

    #[test]
    fn deepar_likelihood_decreases() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut net = DeepAr::new(3, 8, &mut rng);
        let mut adam = Adam::new(1e-2);
        let (x, y) = sine_batch(8, 6, 3);

        let first = net.train_step(&x, &y);
        adam.step(&mut net.params());
        let mut last = first;
        for _ in 0..200 {
            last = net.train_step(&x, &y);
            adam.step(&mut net.params());
        }
        assert!(last < first, "{} -> {}", first, last);
        assert_eq!(net.predict(&x).dim(), (8, 3));
    }

    #[test]
    fn lstm_forecaster_reduces_mae() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut net = LstmForecaster::new(2, 8, &mut rng);
        let mut adam = Adam::new(1e-2);
        let (x, y) = sine_batch(8, 5, 2);

        let first = net.train_step(&x, &y);
        adam.step(&mut net.params());
        let mut last = first;
        for _ in 0..200 {
            last = net.train_step(&x, &y);
            adam.step(&mut net.params());
        }
        assert!(last < first, "{} -> {}", first, last);
    }
}
