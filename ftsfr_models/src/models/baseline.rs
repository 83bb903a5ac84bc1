//! Benchmark models: historical mean and seasonal naive

use crate::error::{ModelError, Result};
use crate::models::{require_len, ForecastModel, ForecastResult, TrainedForecastModel};

/// Forecasts the mean of the training history for every horizon
#[derive(Debug, Clone, Default)]
pub struct HistoricAverage;

/// Trained historic average
#[derive(Debug, Clone)]
pub struct TrainedHistoricAverage {
    mean: f64,
}

impl HistoricAverage {
    pub fn new() -> Self {
        Self
    }
}

impl ForecastModel for HistoricAverage {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        require_len(values, 1, self.name())?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Ok(Box::new(TrainedHistoricAverage { mean }))
    }

    fn name(&self) -> &str {
        "HistoricAverage"
    }
}

impl TrainedForecastModel for TrainedHistoricAverage {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        ForecastResult::new(vec![self.mean; horizon], horizon)
    }

    fn name(&self) -> &str {
        "HistoricAverage"
    }
}

/// Repeats the last observed season
#[derive(Debug, Clone)]
pub struct SeasonalNaive {
    season_length: usize,
}

/// Trained seasonal naive model
#[derive(Debug, Clone)]
pub struct TrainedSeasonalNaive {
    last_season: Vec<f64>,
}

impl SeasonalNaive {
    /// Create a seasonal naive model; a season length of 1 is the plain naive
    pub fn new(season_length: usize) -> Result<Self> {
        if season_length == 0 {
            return Err(ModelError::InvalidParameter(
                "Season length must be positive".to_string(),
            ));
        }
        Ok(Self { season_length })
    }

    pub fn season_length(&self) -> usize {
        self.season_length
    }
}

impl ForecastModel for SeasonalNaive {
    fn train(&self, values: &[f64]) -> Result<Box<dyn TrainedForecastModel>> {
        require_len(values, 1, self.name())?;
        let n = values.len();
        // Fewer observations than one season degrade to the plain naive
        let last_season = if n >= self.season_length {
            values[n - self.season_length..].to_vec()
        } else {
            vec![values[n - 1]]
        };
        Ok(Box::new(TrainedSeasonalNaive { last_season }))
    }

    fn name(&self) -> &str {
        "SeasonalNaive"
    }
}

impl TrainedForecastModel for TrainedSeasonalNaive {
    fn forecast(&self, horizon: usize) -> Result<ForecastResult> {
        let s = self.last_season.len();
        let values = (0..horizon).map(|i| self.last_season[i % s]).collect();
        ForecastResult::new(values, horizon)
    }

    fn name(&self) -> &str {
        "SeasonalNaive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn historic_average_is_flat_mean() {
        let trained = HistoricAverage::new().train(&[1.0, 2.0, 3.0, 6.0]).unwrap();
        assert_eq!(trained.forecast(3).unwrap().values(), &[3.0, 3.0, 3.0]);
    }

    #[test]
    fn seasonal_naive_repeats_last_cycle() {
        let model = SeasonalNaive::new(3).unwrap();
        let trained = model.train(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        assert_eq!(
            trained.forecast(5).unwrap().values(),
            &[5.0, 6.0, 7.0, 5.0, 6.0]
        );
    }

    #[test]
    fn seasonal_naive_short_history_is_naive() {
        let model = SeasonalNaive::new(12).unwrap();
        let trained = model.train(&[1.0, 2.0]).unwrap();
        assert_eq!(trained.forecast(2).unwrap().values(), &[2.0, 2.0]);
    }

    #[test]
    fn empty_history_is_rejected() {
        assert!(HistoricAverage::new().train(&[]).is_err());
        assert!(SeasonalNaive::new(0).is_err());
    }
}
