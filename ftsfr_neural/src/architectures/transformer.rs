//! Encoder-only transformer: value embedding with sinusoidal positions, one
//! self-attention layer and a position-wise feed-forward layer (both
//! residual), then a linear head over the flattened sequence

use super::point_network;
use crate::attention::{positional_encoding, SelfAttention};
use crate::layers::{Dense, Mlp, Param};
use ndarray::{s, Array2};
use rand::rngs::StdRng;

fn split_rows(x: &Array2<f64>, len: usize) -> Vec<Array2<f64>> {
    (0..x.nrows() / len.max(1))
        .map(|b| x.slice(s![b * len..(b + 1) * len, ..]).to_owned())
        .collect()
}

fn stack_rows(parts: &[Array2<f64>], cols: usize) -> Array2<f64> {
    let rows: usize = parts.iter().map(|p| p.nrows()).sum();
    let mut out = Array2::zeros((rows, cols));
    let mut offset = 0;
    for p in parts {
        out.slice_mut(s![offset..offset + p.nrows(), ..]).assign(p);
        offset += p.nrows();
    }
    out
}

#[derive(Debug, Clone)]
pub struct VanillaTransformer {
    input_size: usize,
    d_model: usize,
    positions: Array2<f64>,
    embed: Dense,
    attention: SelfAttention,
    feed_forward: Mlp,
    head: Dense,
    values: Array2<f64>,
    encoded: Array2<f64>,
}

impl VanillaTransformer {
    pub fn new(input_size: usize, horizon: usize, d_model: usize, rng: &mut StdRng) -> Self {
        Self {
            input_size,
            d_model,
            positions: positional_encoding(input_size, d_model),
            embed: Dense::new(1, d_model, rng),
            attention: SelfAttention::new(d_model, rng),
            feed_forward: Mlp::new(&[d_model, 2 * d_model, d_model], rng),
            head: Dense::new(input_size * d_model, horizon, rng),
            values: Array2::zeros((0, 1)),
            encoded: Array2::zeros((0, input_size * d_model)),
        }
    }

    fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        let (batch, len, d) = (x.nrows(), self.input_size, self.d_model);
        self.values = Array2::from_shape_fn((batch * len, 1), |(i, _)| x[[i / len, i % len]]);
        let positions = &self.positions;
        let tiled = Array2::from_shape_fn((batch * len, d), |(i, j)| positions[[i % len, j]]);
        let embedded = self.embed.forward(&self.values) + tiled;

        let attended = self.attention.forward(&split_rows(&embedded, len));
        let z = &embedded + &stack_rows(&attended, d);
        let u = &z + &self.feed_forward.forward(&z);

        self.encoded = Array2::from_shape_fn((batch, len * d), |(b, j)| u[[b * len + j / d, j % d]]);
        self.head.forward(&self.encoded)
    }

    fn backward(&mut self, grad: &Array2<f64>) {
        let (len, d) = (self.input_size, self.d_model);
        let d_encoded = self.head.backward(&self.encoded, grad);
        let d_u = Array2::from_shape_fn((d_encoded.nrows() * len, d), |(i, j)| {
            d_encoded[[i / len, (i % len) * d + j]]
        });
        let d_z = &d_u + &self.feed_forward.backward(&d_u);
        let d_attention_in = self.attention.backward(&split_rows(&d_z, len));
        let d_embedded = &d_z + &stack_rows(&d_attention_in, d);
        self.embed.backward(&self.values, &d_embedded);
    }

    fn params(&mut self) -> Vec<&mut Param> {
        let mut params = self.embed.params();
        params.extend(self.attention.params());
        params.extend(self.feed_forward.params());
        params.extend(self.head.params());
        params
    }
}

point_network!(VanillaTransformer);
