//! Rolling-origin cross-validation over a panel of series
//!
//! Series are fitted independently and in parallel. A model that fails on a
//! series, or returns non-finite values, is replaced for that series by the
//! fallback model so the forecast table keeps one row per test slot.

use crate::error::{ModelError, Result};
use crate::frame::{ForecastRow, ForecastTable, SeriesFrame};
use crate::models::ForecastModel;
use ftsfr_math::transform::fill_missing;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Window layout of a cross-validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossValidation {
    /// Forecast horizon per window
    pub horizon: usize,
    /// Distance between consecutive cutoffs
    pub step_size: usize,
    /// Number of windows, the last one ending at the end of each series
    pub n_windows: usize,
}

impl CrossValidation {
    pub fn new(horizon: usize, step_size: usize, n_windows: usize) -> Result<Self> {
        if horizon == 0 || step_size == 0 || n_windows == 0 {
            return Err(ModelError::InvalidParameter(
                "horizon, step_size and n_windows must be positive".to_string(),
            ));
        }
        Ok(Self {
            horizon,
            step_size,
            n_windows,
        })
    }

    /// A single hold-out window of length `horizon`
    pub fn single_window(horizon: usize) -> Result<Self> {
        Self::new(horizon, horizon, 1)
    }

    /// Index of the last training slot for window `w` of a series of length `n`
    fn cutoff_index(&self, n: usize, w: usize) -> Option<usize> {
        let back = self.horizon + (self.n_windows - 1 - w) * self.step_size;
        n.checked_sub(back + 1)
    }

    /// Run every model on every series; rows are ordered by series, window,
    /// then horizon step
    pub fn run(
        &self,
        series: &[SeriesFrame],
        models: &[Box<dyn ForecastModel>],
        fallback: Option<&dyn ForecastModel>,
    ) -> Result<ForecastTable> {
        if models.is_empty() {
            return Err(ModelError::InvalidParameter(
                "cross-validation needs at least one model".to_string(),
            ));
        }
        let model_names: Vec<String> = models.iter().map(|m| m.name().to_string()).collect();

        let per_series: Vec<Vec<ForecastRow>> = series
            .par_iter()
            .map(|frame| self.run_series(frame, models, fallback))
            .collect();

        let mut table = ForecastTable::new(model_names);
        table.rows = per_series.into_iter().flatten().collect();
        Ok(table)
    }

    fn run_series(
        &self,
        frame: &SeriesFrame,
        models: &[Box<dyn ForecastModel>],
        fallback: Option<&dyn ForecastModel>,
    ) -> Vec<ForecastRow> {
        let n = frame.len();
        let mut rows = Vec::new();
        for w in 0..self.n_windows {
            let cutoff = match self.cutoff_index(n, w) {
                Some(c) => c,
                None => {
                    warn!(
                        series = %frame.unique_id,
                        length = n,
                        "series too short for cross-validation window, skipped"
                    );
                    continue;
                }
            };

            let history = fill_missing(&frame.y[..=cutoff]);
            let predictions: Vec<Vec<Option<f64>>> = models
                .iter()
                .map(|model| match &history {
                    Ok(values) => {
                        predict_with_fallback(model.as_ref(), fallback, values, self.horizon, frame)
                    }
                    Err(_) => vec![None; self.horizon],
                })
                .collect();

            for step in 0..self.horizon {
                let idx = cutoff + 1 + step;
                rows.push(ForecastRow {
                    unique_id: frame.unique_id.clone(),
                    ds: frame.ds[idx],
                    cutoff: frame.ds[cutoff],
                    y: frame.y[idx],
                    predictions: predictions.iter().map(|p| p[step]).collect(),
                });
            }
        }
        rows
    }
}

fn forecast_values(model: &dyn ForecastModel, values: &[f64], horizon: usize) -> Result<Vec<f64>> {
    let forecast = model.train(values)?.forecast(horizon)?;
    if !forecast.is_finite() {
        return Err(ModelError::FitError(format!(
            "{} produced non-finite forecasts",
            model.name()
        )));
    }
    Ok(forecast.into_values())
}

fn predict_with_fallback(
    model: &dyn ForecastModel,
    fallback: Option<&dyn ForecastModel>,
    values: &[f64],
    horizon: usize,
    frame: &SeriesFrame,
) -> Vec<Option<f64>> {
    match forecast_values(model, values, horizon) {
        Ok(v) => v.into_iter().map(Some).collect(),
        Err(err) => {
            let recovered = fallback.and_then(|fb| forecast_values(fb, values, horizon).ok());
            match recovered {
                Some(v) => {
                    debug!(
                        series = %frame.unique_id,
                        model = model.name(),
                        error = %err,
                        "model failed, using fallback forecast"
                    );
                    v.into_iter().map(Some).collect()
                }
                None => {
                    warn!(
                        series = %frame.unique_id,
                        model = model.name(),
                        error = %err,
                        "model failed without fallback"
                    );
                    vec![None; horizon]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as ModelResult;
    use crate::models::{HistoricAverage, SeasonalNaive, TrainedForecastModel};
    use chrono::{Months, NaiveDate};
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct AlwaysFails;

    impl ForecastModel for AlwaysFails {
        fn train(&self, _values: &[f64]) -> ModelResult<Box<dyn TrainedForecastModel>> {
            Err(ModelError::FitError("boom".to_string()))
        }

        fn name(&self) -> &str {
            "AlwaysFails"
        }
    }

    fn monthly(id: &str, start: NaiveDate, y: Vec<Option<f64>>) -> SeriesFrame {
        let ds = (0..y.len())
            .map(|i| start + Months::new(i as u32))
            .collect();
        SeriesFrame::new(id, ds, y)
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
    }

    #[test]
    fn single_window_emits_horizon_rows_per_series() {
        let frames = vec![
            monthly("a", start(), (0..10).map(|v| Some(v as f64)).collect()),
            monthly("b", start(), (0..6).map(|v| Some(v as f64)).collect()),
        ];
        let cv = CrossValidation::single_window(3).unwrap();
        let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(HistoricAverage::new())];
        let table = cv.run(&frames, &models, None).unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(table.rows[0].cutoff, start() + Months::new(6));
        assert_eq!(table.rows[0].ds, start() + Months::new(7));
        assert_eq!(table.rows[0].y, Some(7.0));
        // mean of 0..=6
        assert_eq!(table.rows[0].predictions, vec![Some(3.0)]);
        assert_eq!(table.rows[3].unique_id, "b");
        assert_eq!(table.rows[3].cutoff, start() + Months::new(2));
    }

    #[test]
    fn failing_model_uses_fallback() {
        let frames = vec![monthly(
            "a",
            start(),
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)],
        )];
        let cv = CrossValidation::single_window(2).unwrap();
        let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(AlwaysFails)];
        let fallback = SeasonalNaive::new(1).unwrap();
        let table = cv
            .run(&frames, &models, Some(&fallback as &dyn ForecastModel))
            .unwrap();
        assert_eq!(table.model_names, vec!["AlwaysFails"]);
        assert_eq!(table.predictions("AlwaysFails").unwrap(), vec![Some(3.0), Some(3.0)]);

        let table = cv.run(&frames, &models, None).unwrap();
        assert_eq!(table.predictions("AlwaysFails").unwrap(), vec![None, None]);
    }

    #[test]
    fn gaps_in_history_are_filled_and_test_nulls_kept() {
        let frames = vec![monthly(
            "a",
            start(),
            vec![None, Some(2.0), None, Some(4.0), None, Some(6.0)],
        )];
        let cv = CrossValidation::single_window(2).unwrap();
        let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(SeasonalNaive::new(1).unwrap())];
        let table = cv.run(&frames, &models, None).unwrap();
        assert_eq!(table.rows[0].y, None);
        assert_eq!(table.rows[1].y, Some(6.0));
        assert_eq!(table.predictions("SeasonalNaive").unwrap(), vec![Some(4.0), Some(4.0)]);
    }

    #[test]
    fn multiple_windows_step_back_from_the_end() {
        let frames = vec![monthly("a", start(), (0..12).map(|v| Some(v as f64)).collect())];
        let cv = CrossValidation::new(2, 3, 2).unwrap();
        let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(SeasonalNaive::new(1).unwrap())];
        let table = cv.run(&frames, &models, None).unwrap();
        let cutoffs: Vec<NaiveDate> = table.rows.iter().map(|r| r.cutoff).collect();
        assert_eq!(
            cutoffs,
            vec![
                start() + Months::new(6),
                start() + Months::new(6),
                start() + Months::new(9),
                start() + Months::new(9),
            ]
        );
    }

    #[test]
    fn short_series_are_skipped() {
        let frames = vec![monthly("a", start(), vec![Some(1.0), Some(2.0)])];
        let cv = CrossValidation::single_window(2).unwrap();
        let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(HistoricAverage::new())];
        assert!(cv.run(&frames, &models, None).unwrap().is_empty());
    }
}
