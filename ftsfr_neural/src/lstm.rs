//! Single-layer LSTM unrolled over a sequence, with backpropagation
//! through time

use crate::layers::{sigmoid, Param};
use ndarray::{s, Array2, Axis};
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
struct StepCache {
    xh: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    c_prev: Array2<f64>,
    tanh_c: Array2<f64>,
}

/// LSTM layer; gates are stacked `[input, forget, candidate, output]`
#[derive(Debug, Clone)]
pub struct Lstm {
    pub input_size: usize,
    pub hidden_size: usize,
    weight: Param,
    bias: Param,
    cache: Vec<StepCache>,
}

impl Lstm {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let mut bias = Param::zeros(1, 4 * hidden_size);
        bias.value
            .slice_mut(s![.., hidden_size..2 * hidden_size])
            .fill(1.0);
        Self {
            input_size,
            hidden_size,
            weight: Param::xavier(input_size + hidden_size, 4 * hidden_size, rng),
            bias,
            cache: Vec::new(),
        }
    }

    fn gates(
        &self,
        xh: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
        let hs = self.hidden_size;
        let z = xh.dot(&self.weight.value) + &self.bias.value;
        (
            z.slice(s![.., ..hs]).mapv(sigmoid),
            z.slice(s![.., hs..2 * hs]).mapv(sigmoid),
            z.slice(s![.., 2 * hs..3 * hs]).mapv(f64::tanh),
            z.slice(s![.., 3 * hs..]).mapv(sigmoid),
        )
    }

    /// Advance `(h, c)` by one input without recording anything for the
    /// backward pass
    pub fn step(
        &self,
        x: &Array2<f64>,
        h: &Array2<f64>,
        c: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>) {
        let mut xh = Array2::zeros((x.nrows(), self.input_size + self.hidden_size));
        xh.slice_mut(s![.., ..self.input_size]).assign(x);
        xh.slice_mut(s![.., self.input_size..]).assign(h);
        let (i, f, g, o) = self.gates(&xh);
        let c_next = &f * c + &i * &g;
        let h_next = &o * &c_next.mapv(f64::tanh);
        (h_next, c_next)
    }

    /// Run the sequence `xs` (each `batch x input_size`) from a zero state and
    /// return the hidden state after every step
    pub fn forward(&mut self, xs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache.clear();
        let hs = self.hidden_size;
        let batch = xs.first().map_or(0, |x| x.nrows());
        let mut h = Array2::zeros((batch, hs));
        let mut c = Array2::<f64>::zeros((batch, hs));
        let mut outputs = Vec::with_capacity(xs.len());

        for x in xs {
            let mut xh = Array2::zeros((batch, self.input_size + hs));
            xh.slice_mut(s![.., ..self.input_size]).assign(x);
            xh.slice_mut(s![.., self.input_size..]).assign(&h);

            let (i, f, g, o) = self.gates(&xh);
            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            h = &o * &tanh_c;

            self.cache.push(StepCache {
                xh,
                i,
                f,
                g,
                o,
                c_prev: c,
                tanh_c,
            });
            c = c_next;
            outputs.push(h.clone());
        }
        outputs
    }

    /// Backpropagate the per-step hidden-state gradients of the last forward
    /// pass; returns the gradient with respect to every input step
    pub fn backward(&mut self, grad_h: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let hs = self.hidden_size;
        let n_in = self.input_size;
        let steps = self.cache.len();
        let batch = self.cache.first().map_or(0, |c| c.xh.nrows());
        let mut dh_next = Array2::<f64>::zeros((batch, hs));
        let mut dc_next = Array2::<f64>::zeros((batch, hs));
        let mut dxs = vec![Array2::zeros((batch, n_in)); steps];

        for t in (0..steps).rev() {
            let step = &self.cache[t];
            let dh = match grad_h.get(t) {
                Some(g) => g + &dh_next,
                None => dh_next.clone(),
            };

            let d_o = &dh * &step.tanh_c;
            let dc = &dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz = Array2::zeros((batch, 4 * hs));
            dz.slice_mut(s![.., ..hs])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., hs..2 * hs])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * hs..3 * hs])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * hs..])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            self.weight.grad += &step.xh.t().dot(&dz);
            self.bias.grad += &dz.sum_axis(Axis(0)).insert_axis(Axis(0));

            let dxh = dz.dot(&self.weight.value.t());
            dxs[t] = dxh.slice(s![.., ..n_in]).to_owned();
            dh_next = dxh.slice(s![.., n_in..]).to_owned();
        }
        dxs
    }

    pub fn params(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    fn sequence() -> Vec<Array2<f64>> {
        vec![array![[0.5], [-0.2]], array![[0.1], [0.4]], array![[-0.3], [0.9]]]
    }

    #[test]
    fn hidden_states_have_batch_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut lstm = Lstm::new(1, 4, &mut rng);
        let hs = lstm.forward(&sequence());
        assert_eq!(hs.len(), 3);
        assert_eq!(hs[2].dim(), (2, 4));
        assert!(hs[2].iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn stepping_matches_the_unrolled_pass() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut lstm = Lstm::new(1, 3, &mut rng);
        let xs = sequence();
        let unrolled = lstm.forward(&xs);

        let mut h = Array2::zeros((2, 3));
        let mut c = Array2::zeros((2, 3));
        for x in &xs {
            let (h_next, c_next) = lstm.step(x, &h, &c);
            h = h_next;
            c = c_next;
        }
        for (a, b) in h.iter().zip(unrolled[2].iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn bptt_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut lstm = Lstm::new(1, 3, &mut rng);
        let xs = sequence();

        // loss = sum of the last hidden state
        let hs = lstm.forward(&xs);
        let mut grads = vec![Array2::zeros((2, 3)); 3];
        grads[2] = Array2::ones((2, 3));
        lstm.backward(&grads);
        let analytic = lstm.weight.grad[[0, 1]];
        let base = hs[2].sum();

        let eps = 1e-6;
        let mut bumped = lstm.clone();
        bumped.weight.value[[0, 1]] += eps;
        let numeric = (bumped.forward(&xs)[2].sum() - base) / eps;
        assert_relative_eq!(analytic, numeric, epsilon = 1e-5);
    }
}
