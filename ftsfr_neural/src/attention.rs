//! Scaled dot-product self-attention over a single sequence

use crate::layers::Param;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
struct AttentionCache {
    x: Array2<f64>,
    q: Array2<f64>,
    k: Array2<f64>,
    v: Array2<f64>,
    a: Array2<f64>,
    o: Array2<f64>,
}

/// Row-wise softmax
pub fn softmax_rows(x: &Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    out
}

/// Fixed sinusoidal position encoding, `len x d_model`
pub fn positional_encoding(len: usize, d_model: usize) -> Array2<f64> {
    Array2::from_shape_fn((len, d_model), |(pos, i)| {
        let rate = 10000f64.powf((2 * (i / 2)) as f64 / d_model as f64);
        let angle = pos as f64 / rate;
        if i % 2 == 0 {
            angle.sin()
        } else {
            angle.cos()
        }
    })
}

/// Single-head self-attention with an output projection
#[derive(Debug, Clone)]
pub struct SelfAttention {
    d_model: usize,
    wq: Param,
    wk: Param,
    wv: Param,
    wo: Param,
    cache: Vec<AttentionCache>,
}

impl SelfAttention {
    pub fn new(d_model: usize, rng: &mut StdRng) -> Self {
        Self {
            d_model,
            wq: Param::xavier(d_model, d_model, rng),
            wk: Param::xavier(d_model, d_model, rng),
            wv: Param::xavier(d_model, d_model, rng),
            wo: Param::xavier(d_model, d_model, rng),
            cache: Vec::new(),
        }
    }

    /// Attend within each sequence of the batch (each `len x d_model`)
    pub fn forward(&mut self, xs: &[Array2<f64>]) -> Vec<Array2<f64>> {
        self.cache.clear();
        let scale = 1.0 / (self.d_model as f64).sqrt();
        xs.iter()
            .map(|x| {
                let q = x.dot(&self.wq.value);
                let k = x.dot(&self.wk.value);
                let v = x.dot(&self.wv.value);
                let a = softmax_rows(&(q.dot(&k.t()) * scale));
                let o = a.dot(&v);
                let out = o.dot(&self.wo.value);
                self.cache.push(AttentionCache {
                    x: x.clone(),
                    q,
                    k,
                    v,
                    a,
                    o,
                });
                out
            })
            .collect()
    }

    pub fn backward(&mut self, grads: &[Array2<f64>]) -> Vec<Array2<f64>> {
        let scale = 1.0 / (self.d_model as f64).sqrt();
        let mut dxs = Vec::with_capacity(grads.len());
        for (cache, grad) in self.cache.iter().zip(grads) {
            self.wo.grad += &cache.o.t().dot(grad);
            let d_o = grad.dot(&self.wo.value.t());

            let d_a = d_o.dot(&cache.v.t());
            let d_v = cache.a.t().dot(&d_o);

            // softmax backward: dS = A * (dA - rowsum(dA * A))
            let row_dot: Array1<f64> = (&d_a * &cache.a).sum_axis(Axis(1));
            let d_s = &cache.a * &(&d_a - &row_dot.insert_axis(Axis(1))) * scale;

            let d_q = d_s.dot(&cache.k);
            let d_k = d_s.t().dot(&cache.q);

            self.wq.grad += &cache.x.t().dot(&d_q);
            self.wk.grad += &cache.x.t().dot(&d_k);
            self.wv.grad += &cache.x.t().dot(&d_v);

            let dx = d_q.dot(&self.wq.value.t())
                + d_k.dot(&self.wk.value.t())
                + d_v.dot(&self.wv.value.t());
            dxs.push(dx);
        }
        dxs
    }

    pub fn params(&mut self) -> Vec<&mut Param> {
        vec![&mut self.wq, &mut self.wk, &mut self.wv, &mut self.wo]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn softmax_rows_sum_to_one() {
        let s = softmax_rows(&array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        for row in s.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(s[[1, 0]], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn positional_encoding_starts_with_sin_cos_of_zero() {
        let pe = positional_encoding(4, 6);
        assert_eq!(pe.dim(), (4, 6));
        assert_eq!(pe[[0, 0]], 0.0);
        assert_eq!(pe[[0, 1]], 1.0);
    }

    #[test]
    fn attention_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut attn = SelfAttention::new(2, &mut rng);
        let x = vec![array![[0.3, -0.1], [0.8, 0.5], [-0.4, 0.2]]];

        let base = attn.forward(&x)[0].sum();
        let dxs = attn.backward(&[Array2::ones((3, 2))]);
        let analytic_w = attn.wk.grad[[1, 0]];
        let analytic_x = dxs[0][[1, 1]];

        let eps = 1e-6;
        let mut bumped = attn.clone();
        bumped.wk.value[[1, 0]] += eps;
        let numeric_w = (bumped.forward(&x)[0].sum() - base) / eps;
        assert_relative_eq!(analytic_w, numeric_w, epsilon = 1e-5);

        let mut x_bumped = x.clone();
        x_bumped[0][[1, 1]] += eps;
        let numeric_x = (attn.clone().forward(&x_bumped)[0].sum() - base) / eps;
        assert_relative_eq!(analytic_x, numeric_x, epsilon = 1e-5);
    }
}
