//! Croston's method for intermittent demand

use crate::error::Result;
use crate::models::{require_len, ForecastModel, ForecastResult, TrainedForecastModel};

/// Classic Croston with a fixed smoothing parameter for sizes and intervals
#[derive(Debug, Clone)]
pub struct CrostonClassic {
    alpha: f64,
}

/// Trained Croston model
#[derive(Debug, Clone)]
pub struct TrainedCroston {
    rate: f64,
}

impl Default for CrostonClassic {
    fn default() -> Self {
        Self { alpha: 0.1 }
    }
}

impl CrostonClassic {
    pub fn new() -> Self {
        Self::default()
    }
}

fn smooth(values: &[f64], alpha: f64) -> f64 {
    let mut level = values[0];
    for v in &values[1..] {
        level = alpha * v + (1.0 - alpha) * level;
    }
    level
}

impl ForecastModel for CrostonClassic {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        require_len(values, 1, self.name())?;

        let mut sizes = Vec::new();
        let mut intervals = Vec::new();
        let mut last = None;
        for (i, v) in values.iter().enumerate() {
            if *v != 0.0 {
                sizes.push(*v);
                intervals.push(match last {
                    Some(prev) => (i - prev) as f64,
                    None => (i + 1) as f64,
                });
                last = Some(i);
            }
        }

        let rate = if sizes.is_empty() {
            0.0
        } else {
            smooth(&sizes, self.alpha) / smooth(&intervals, self.alpha)
        };
        Ok(Box::new(TrainedCroston { rate }))
    }

    fn name(&self) -> &str {
        "CrostonClassic"
    }
}

impl TrainedForecastModel for TrainedCroston {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        ForecastResult::new(vec![self.rate; horizon], horizon)
    }

    fn name(&self) -> &str {
        "CrostonClassic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn regular_demand_is_its_level() {
        let trained = CrostonClassic::new().train(&[4.0; 20]).unwrap();
        assert_relative_eq!(trained.forecast(1).unwrap().values()[0], 4.0);
    }

    #[test]
    fn intermittent_demand_is_divided_by_interval() {
        let values = [0.0, 6.0, 0.0, 6.0, 0.0, 6.0, 0.0, 6.0];
        let trained = CrostonClassic::new().train(&values).unwrap();
        assert_relative_eq!(trained.forecast(2).unwrap().values()[1], 3.0);
    }

    #[test]
    fn no_demand_forecasts_zero() {
        let trained = CrostonClassic::new().train(&[0.0; 5]).unwrap();
        assert_eq!(trained.forecast(3).unwrap().values(), &[0.0, 0.0, 0.0]);
    }
}
