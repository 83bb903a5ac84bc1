//! Building blocks with hand-written backpropagation
//!
//! Every trainable tensor is a [`Param`] holding its value, the accumulated
//! gradient and the Adam moment estimates. Layers are stateless on the
//! forward pass; callers keep whatever inputs the backward pass needs.

use ndarray::{Array2, Axis, Zip};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;

/// A trainable matrix with its gradient and optimizer state
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Array2<f64>,
    pub grad: Array2<f64>,
    m: Array2<f64>,
    v: Array2<f64>,
}

impl Param {
    pub fn new(value: Array2<f64>) -> Self {
        let dim = value.dim();
        Self {
            value,
            grad: Array2::zeros(dim),
            m: Array2::zeros(dim),
            v: Array2::zeros(dim),
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(Array2::zeros((rows, cols)))
    }

    /// Xavier/Glorot uniform initialisation
    pub fn xavier(rows: usize, cols: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (rows + cols) as f64).sqrt();
        Self::new(Array2::random_using(
            (rows, cols),
            Uniform::new(-limit, limit),
            rng,
        ))
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Adam optimizer with optional global gradient-norm clipping
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub clip_norm: Option<f64>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            clip_norm: Some(1.0),
            t: 0,
        }
    }

    /// Apply one update to every parameter and clear the gradients
    pub fn step(&mut self, params: &mut [&mut Param]) {
        self.t += 1;

        let scale = match self.clip_norm {
            Some(max_norm) => {
                let norm = params
                    .iter()
                    .map(|p| p.grad.iter().map(|g| g * g).sum::<f64>())
                    .sum::<f64>()
                    .sqrt();
                if norm > max_norm && norm.is_finite() {
                    max_norm / norm
                } else {
                    1.0
                }
            }
            None => 1.0,
        };

        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(self.t);
        let correction2 = 1.0 - b2.powi(self.t);
        let lr = self.learning_rate;
        let eps = self.epsilon;

        for p in params.iter_mut() {
            let Param { value, grad, m, v } = &mut **p;
            Zip::from(value)
                .and(&mut *m)
                .and(&mut *v)
                .and(&*grad)
                .for_each(|w, m, v, &g| {
                    let g = g * scale;
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
            grad.fill(0.0);
        }
    }
}

/// Fully connected layer `y = x W + b`
#[derive(Debug, Clone)]
pub struct Dense {
    pub weight: Param,
    pub bias: Param,
}

impl Dense {
    pub fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        Self {
            weight: Param::xavier(input_size, output_size, rng),
            bias: Param::zeros(1, output_size),
        }
    }

    pub fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.weight.value) + &self.bias.value
    }

    /// Accumulate gradients for the batch `x` and return the input gradient
    pub fn backward(&mut self, x: &Array2<f64>, grad: &Array2<f64>) -> Array2<f64> {
        self.weight.grad += &x.t().dot(grad);
        self.bias.grad += &grad.sum_axis(Axis(0)).insert_axis(Axis(0));
        grad.dot(&self.weight.value.t())
    }

    pub fn params(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight, &mut self.bias]
    }
}

pub fn relu(x: &Array2<f64>) -> Array2<f64> {
    x.mapv(|v| v.max(0.0))
}

/// Gradient through a ReLU given its pre-activation
pub fn relu_backward(pre: &Array2<f64>, grad: &Array2<f64>) -> Array2<f64> {
    let mut out = grad.clone();
    Zip::from(&mut out).and(pre).for_each(|g, &z| {
        if z <= 0.0 {
            *g = 0.0;
        }
    });
    out
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn softplus(x: f64) -> f64 {
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

/// Multi-layer perceptron with ReLU between layers and a linear output
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Dense>,
    inputs: Vec<Array2<f64>>,
    pre: Vec<Array2<f64>>,
}

impl Mlp {
    /// `sizes` lists the width of every layer boundary, input first
    pub fn new(sizes: &[usize], rng: &mut StdRng) -> Self {
        let layers = sizes
            .windows(2)
            .map(|w| Dense::new(w[0], w[1], rng))
            .collect();
        Self {
            layers,
            inputs: Vec::new(),
            pre: Vec::new(),
        }
    }

    pub fn forward(&mut self, x: &Array2<f64>) -> Array2<f64> {
        self.inputs.clear();
        self.pre.clear();
        let last = self.layers.len().saturating_sub(1);
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&h);
            self.inputs.push(h);
            if i < last {
                h = relu(&z);
                self.pre.push(z);
            } else {
                h = z;
            }
        }
        h
    }

    pub fn backward(&mut self, grad: &Array2<f64>) -> Array2<f64> {
        let last = self.layers.len().saturating_sub(1);
        let mut g = grad.clone();
        for i in (0..self.layers.len()).rev() {
            if i < last {
                g = relu_backward(&self.pre[i], &g);
            }
            g = self.layers[i].backward(&self.inputs[i], &g);
        }
        g
    }

    pub fn params(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| l.params()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn dense_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut layer = Dense::new(3, 2, &mut rng);
        let x = array![[0.5, -1.0, 2.0], [1.5, 0.3, -0.7]];

        // loss = sum(y)
        let ones = Array2::ones((2, 2));
        layer.backward(&x, &ones);
        let analytic = layer.weight.grad[[1, 0]];

        let eps = 1e-6;
        let mut bumped = layer.clone();
        bumped.weight.value[[1, 0]] += eps;
        let numeric = (bumped.forward(&x).sum() - layer.forward(&x).sum()) / eps;
        assert_relative_eq!(analytic, numeric, epsilon = 1e-5);
    }

    #[test]
    fn adam_minimises_a_quadratic() {
        let mut p = Param::new(array![[3.0, -2.0]]);
        let mut adam = Adam::new(0.1);
        for _ in 0..500 {
            p.grad = p.value.mapv(|w| 2.0 * w);
            adam.step(&mut [&mut p]);
        }
        assert!(p.value.iter().all(|w| w.abs() < 1e-2));
        assert!(p.grad.iter().all(|g| *g == 0.0));
    }

    #[test]
    fn mlp_learns_a_linear_map() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut mlp = Mlp::new(&[2, 8, 1], &mut rng);
        let mut adam = Adam::new(0.01);
        let x = array![[0.0, 1.0], [1.0, 0.0], [1.0, 1.0], [0.5, 0.5]];
        let y = x.dot(&array![[2.0], [-1.0]]);

        let mse = |mlp: &mut Mlp| {
            let out = mlp.forward(&x);
            (&out - &y).mapv(|e| e * e).mean().unwrap_or(f64::NAN)
        };
        let before = mse(&mut mlp);
        for _ in 0..1500 {
            let out = mlp.forward(&x);
            let grad = (&out - &y) * (2.0 / 4.0);
            mlp.backward(&grad);
            adam.step(&mut mlp.params());
        }
        assert!(mse(&mut mlp) < before * 0.05);
    }

    #[test]
    fn relu_backward_masks_negative_inputs() {
        let pre = array![[-1.0, 2.0]];
        let grad = array![[5.0, 5.0]];
        assert_eq!(relu_backward(&pre, &grad), array![[0.0, 5.0]]);
    }
}
