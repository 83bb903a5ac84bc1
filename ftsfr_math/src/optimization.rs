//! Derivative-free minimization
//!
//! Bounded Nelder-Mead simplex search used to fit smoothing and ARMA
//! parameters. Non-finite objective values are treated as +inf so a model
//! can reject a parameter vector by returning NaN.

/// Result of a Nelder-Mead run
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// Best point found
    pub point: Vec<f64>,
    /// Objective value at `point`
    pub value: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Whether the simplex collapsed below tolerance
    pub converged: bool,
}

/// Nelder-Mead configuration
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    pub max_iter: usize,
    pub tolerance: f64,
    /// Reflection coefficient
    pub alpha: f64,
    /// Expansion coefficient
    pub gamma: f64,
    /// Contraction coefficient
    pub rho: f64,
    /// Shrink coefficient
    pub sigma: f64,
    /// Relative size of the initial simplex
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            tolerance: 1e-8,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.05,
        }
    }
}

impl NelderMeadConfig {
    /// Config with a different iteration cap
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

fn clamp_to(point: &mut [f64], bounds: Option<&[(f64, f64)]>) {
    if let Some(bounds) = bounds {
        for (x, (lo, hi)) in point.iter_mut().zip(bounds.iter()) {
            *x = x.clamp(*lo, *hi);
        }
    }
}

/// Move `from` towards (or through) `to` by `coef`: `from + coef * (to - from)`
fn towards(from: &[f64], to: &[f64], coef: f64) -> Vec<f64> {
    from.iter()
        .zip(to.iter())
        .map(|(f, t)| f + coef * (t - f))
        .collect()
}

/// Minimize `objective` starting at `initial`, keeping every coordinate inside
/// `bounds` when given
pub fn nelder_mead<F>(
    objective: F,
    initial: &[f64],
    bounds: Option<&[(f64, f64)]>,
    config: &NelderMeadConfig,
) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        return NelderMeadResult {
            point: Vec::new(),
            value: sanitize(objective(&[])),
            iterations: 0,
            converged: true,
        };
    }

    let mut start = initial.to_vec();
    clamp_to(&mut start, bounds);

    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(start.clone());
    for i in 0..n {
        let mut vertex = start.clone();
        let step = if vertex[i].abs() > 1e-10 {
            config.initial_step * vertex[i].abs()
        } else {
            config.initial_step
        };
        vertex[i] += step;
        if let Some(b) = bounds {
            if vertex[i] > b[i].1 {
                vertex[i] = start[i] - step;
            }
        }
        clamp_to(&mut vertex, bounds);
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| sanitize(objective(v))).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        let spread = (values[worst] - values[best]).abs();
        if spread.is_finite() && spread < config.tolerance {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; n];
        for (i, vertex) in simplex.iter().enumerate() {
            if i != worst {
                for (c, x) in centroid.iter_mut().zip(vertex.iter()) {
                    *c += x / n as f64;
                }
            }
        }

        let size = simplex
            .iter()
            .map(|v| {
                v.iter()
                    .zip(centroid.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .fold(0.0, f64::max);
        if size < config.tolerance {
            converged = true;
            break;
        }

        let mut reflected = towards(&centroid, &simplex[worst], -config.alpha);
        clamp_to(&mut reflected, bounds);
        let f_reflected = sanitize(objective(&reflected));

        if f_reflected < values[best] {
            let mut expanded = towards(&centroid, &reflected, config.gamma);
            clamp_to(&mut expanded, bounds);
            let f_expanded = sanitize(objective(&expanded));
            if f_expanded < f_reflected {
                simplex[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = f_reflected;
            continue;
        }

        let (mut contracted, threshold) = if f_reflected < values[worst] {
            (towards(&centroid, &reflected, config.rho), f_reflected)
        } else {
            (towards(&centroid, &simplex[worst], config.rho), values[worst])
        };
        clamp_to(&mut contracted, bounds);
        let f_contracted = sanitize(objective(&contracted));
        if f_contracted < threshold {
            simplex[worst] = contracted;
            values[worst] = f_contracted;
            continue;
        }

        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i == best {
                continue;
            }
            let mut shrunk = towards(&anchor, &simplex[i], config.sigma);
            clamp_to(&mut shrunk, bounds);
            values[i] = sanitize(objective(&shrunk));
            simplex[i] = shrunk;
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    NelderMeadResult {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn finds_quadratic_minimum() {
        let result = nelder_mead(
            |x| (x[0] - 2.0).powi(2) + (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            None,
            &NelderMeadConfig::default(),
        );
        assert!(result.converged);
        assert_abs_diff_eq!(result.point[0], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.point[1], -1.0, epsilon = 1e-3);
    }

    #[test]
    fn respects_bounds() {
        let bounds = [(0.0, 1.0)];
        let result = nelder_mead(
            |x| (x[0] - 3.0).powi(2),
            &[0.5],
            Some(&bounds),
            &NelderMeadConfig::default(),
        );
        assert!(result.point[0] <= 1.0);
        assert_abs_diff_eq!(result.point[0], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn nan_objective_is_avoided() {
        let result = nelder_mead(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 0.5).powi(2) },
            &[0.1],
            None,
            &NelderMeadConfig::default(),
        );
        assert!(result.value.is_finite());
        assert_abs_diff_eq!(result.point[0], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn empty_point_evaluates_once() {
        let result = nelder_mead(|_| 4.0, &[], None, &NelderMeadConfig::default());
        assert!(result.point.is_empty());
        assert_eq!(result.value, 4.0);
    }
}
