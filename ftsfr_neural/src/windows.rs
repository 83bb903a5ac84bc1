//! Sliding windows over a panel of gap-free series

use crate::scaler::{ScalerType, WindowScale};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;

/// Input window ending at `end` (exclusive) with its target horizon
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub input: Vec<f64>,
    pub target: Vec<f64>,
    /// Leading slots of `input` that precede the start of the series
    pub padding: usize,
}

/// Scaled mini-batch
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
    pub scales: Vec<WindowScale>,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSampler {
    pub input_size: usize,
    pub horizon: usize,
    /// Allow windows whose input starts before the series does
    pub start_padding: bool,
}

impl WindowSampler {
    pub fn new(input_size: usize, horizon: usize, start_padding: bool) -> Self {
        Self {
            input_size,
            horizon,
            start_padding,
        }
    }

    /// Every `(series, end)` pair with a complete target
    pub fn positions(&self, panel: &[Vec<f64>]) -> Vec<(usize, usize)> {
        let first_end = if self.start_padding { 1 } else { self.input_size };
        panel
            .iter()
            .enumerate()
            .flat_map(|(s, values)| {
                let last_end = values.len().saturating_sub(self.horizon);
                (first_end..=last_end).map(move |end| (s, end))
            })
            .collect()
    }

    /// Window whose input ends just before `end`; the target is whatever of
    /// `values[end..end + horizon]` exists
    pub fn window(&self, values: &[f64], end: usize) -> Window {
        let start = end.saturating_sub(self.input_size);
        let padding = self.input_size - (end - start);
        let mut input = vec![0.0; padding];
        input.extend_from_slice(&values[start..end]);
        let stop = (end + self.horizon).min(values.len());
        Window {
            input,
            target: values[end..stop].to_vec(),
            padding,
        }
    }

    /// Forecasting context: the last `input_size` values
    pub fn context(&self, values: &[f64]) -> Window {
        self.window(values, values.len())
    }

    /// Draw `size` training windows uniformly from `positions`
    pub fn sample(
        &self,
        panel: &[Vec<f64>],
        positions: &[(usize, usize)],
        size: usize,
        rng: &mut StdRng,
    ) -> Vec<Window> {
        (0..size)
            .map(|_| {
                let (s, end) = positions[rng.gen_range(0..positions.len())];
                self.window(&panel[s], end)
            })
            .collect()
    }
}

/// Scale every window by its own observed inputs; padded slots become 0
pub fn make_batch(windows: &[Window], scaler: ScalerType, horizon: usize) -> Batch {
    let input_size = windows.first().map_or(0, |w| w.input.len());
    let mut x = Array2::zeros((windows.len(), input_size));
    let mut y = Array2::zeros((windows.len(), horizon));
    let mut scales = Vec::with_capacity(windows.len());

    for (row, w) in windows.iter().enumerate() {
        let scale = scaler.fit(&w.input[w.padding..]);
        for (col, v) in w.input.iter().enumerate().skip(w.padding) {
            x[[row, col]] = scale.transform(*v);
        }
        for (col, v) in w.target.iter().enumerate().take(horizon) {
            y[[row, col]] = scale.transform(*v);
        }
        scales.push(scale);
    }
    Batch { x, y, scales }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn positions_respect_start_padding() {
        let panel = vec![vec![0.0; 10]];
        let padded = WindowSampler::new(4, 3, true).positions(&panel);
        assert_eq!(padded.first(), Some(&(0, 1)));
        assert_eq!(padded.last(), Some(&(0, 7)));
        assert_eq!(padded.len(), 7);

        let strict = WindowSampler::new(4, 3, false).positions(&panel);
        assert_eq!(strict.len(), 4);
    }

    #[test]
    fn short_window_is_left_padded() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let w = WindowSampler::new(4, 2, true).window(&values, 2);
        assert_eq!(w.input, vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(w.padding, 2);
        assert_eq!(w.target, vec![3.0, 4.0]);
    }

    #[test]
    fn context_has_no_target() {
        let values = [1.0, 2.0, 3.0];
        let w = WindowSampler::new(2, 4, true).context(&values);
        assert_eq!(w.input, vec![2.0, 3.0]);
        assert!(w.target.is_empty());
    }

    #[test]
    fn batch_scales_each_window_independently() {
        let sampler = WindowSampler::new(3, 1, true);
        let windows = vec![
            sampler.window(&[1.0, 2.0, 3.0, 4.0], 3),
            sampler.window(&[100.0, 200.0, 300.0, 400.0], 3),
        ];
        let batch = make_batch(&windows, ScalerType::Robust, 1);
        assert_eq!(batch.x.row(0), batch.x.row(1));
        assert_eq!(batch.y[[0, 0]], 2.0);
        assert_eq!(batch.scales[1].center, 200.0);
    }

    #[test]
    fn sampling_is_seeded() {
        let panel = vec![(0..50).map(f64::from).collect::<Vec<_>>()];
        let sampler = WindowSampler::new(5, 2, true);
        let positions = sampler.positions(&panel);
        let a = sampler.sample(&panel, &positions, 4, &mut StdRng::seed_from_u64(9));
        let b = sampler.sample(&panel, &positions, 4, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
