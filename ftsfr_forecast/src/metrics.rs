//! Error metrics of a forecast table against its training panel
//!
//! Every series is scored against its own training history, cut at its own
//! cutoff. A single panel-wide cutoff would truncate the history of series
//! that end early and push their MASE denominators towards zero.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use ftsfr_math::stats::{lagged_mae, mean};
use ftsfr_models::{ForecastTable, SeriesFrame};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Share of series with a valid MASE below which a warning is logged
pub const MIN_MASE_COVERAGE: f64 = 0.1;

/// Training frames cut at each series' cutoff; series without a cutoff are
/// left out
pub fn align_train(
    train: &[SeriesFrame],
    cutoffs: &HashMap<String, NaiveDate>,
) -> Vec<SeriesFrame> {
    train
        .iter()
        .filter_map(|frame| {
            let cutoff = cutoffs.get(&frame.unique_id)?;
            let keep = frame.ds.partition_point(|ds| ds <= cutoff);
            Some(SeriesFrame::new(
                frame.unique_id.clone(),
                frame.ds[..keep].to_vec(),
                frame.y[..keep].to_vec(),
            ))
        })
        .collect()
}

/// Metrics of one model on one series; `None` where undefined
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMetrics {
    pub unique_id: String,
    pub mase: Option<f64>,
    pub mse: Option<f64>,
    pub r2oos: Option<f64>,
}

/// Score one series from its (actual, prediction) test pairs
pub fn series_metrics(
    unique_id: &str,
    pairs: &[(Option<f64>, Option<f64>)],
    train: &[Option<f64>],
    seasonality: usize,
) -> SeriesMetrics {
    let scored: Vec<(f64, f64)> = pairs
        .iter()
        .filter_map(|(a, p)| Some(((*a)?, (*p)?)))
        .collect();
    if scored.is_empty() {
        return SeriesMetrics {
            unique_id: unique_id.to_string(),
            mase: None,
            mse: None,
            r2oos: None,
        };
    }
    let n = scored.len() as f64;
    let mae = scored.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    let mse = scored.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;

    let history: Vec<f64> = train.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let scale = lagged_mae(&history, seasonality.max(1)).filter(|s| *s > 0.0 && s.is_finite());
    let mase = scale.map(|s| mae / s);

    let r2oos = mean(&history).and_then(|benchmark| {
        let bench_mse = scored
            .iter()
            .map(|(a, _)| (a - benchmark).powi(2))
            .sum::<f64>()
            / n;
        (bench_mse > 0.0).then(|| 1.0 - mse / bench_mse)
    });

    SeriesMetrics {
        unique_id: unique_id.to_string(),
        mase,
        mse: Some(mse),
        r2oos,
    }
}

/// Panel-level metrics of one model column
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub model: String,
    pub mase: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2oos: f64,
    pub n_series: usize,
    pub n_valid_mase: usize,
}

impl MetricSummary {
    /// Mean over series, skipping undefined values; RMSE is the root of the
    /// mean MSE
    pub fn from_series(model: &str, series: &[SeriesMetrics]) -> Self {
        let avg = |pick: fn(&SeriesMetrics) -> Option<f64>| {
            let values: Vec<f64> = series.iter().filter_map(pick).collect();
            mean(&values).unwrap_or(f64::NAN)
        };
        let mse = avg(|s| s.mse);
        Self {
            model: model.to_string(),
            mase: avg(|s| s.mase),
            mse,
            rmse: mse.sqrt(),
            r2oos: avg(|s| s.r2oos),
            n_series: series.len(),
            n_valid_mase: series.iter().filter(|s| s.mase.is_some()).count(),
        }
    }

    /// Reject NaN, infinite and exactly-zero MASE values
    pub fn validate(&self, dataset: &str) -> Result<()> {
        let fail = |field: &str, value: f64| ForecastError::MetricComputationError {
            dataset: dataset.to_string(),
            model: self.model.clone(),
            field: field.to_string(),
            value,
        };
        for (field, value) in [
            ("MASE", self.mase),
            ("MSE", self.mse),
            ("RMSE", self.rmse),
            ("R2oos", self.r2oos),
        ] {
            if !value.is_finite() {
                return Err(fail(field, value));
            }
        }
        if self.mase == 0.0 {
            return Err(fail("MASE", self.mase));
        }
        if (self.n_valid_mase as f64) < MIN_MASE_COVERAGE * self.n_series as f64 {
            warn!(
                dataset,
                model = %self.model,
                valid = self.n_valid_mase,
                series = self.n_series,
                "fewer than 10% of series produced a valid MASE"
            );
        }
        Ok(())
    }
}

/// Per-series metrics of one model column of `table`
pub fn model_series_metrics(
    table: &ForecastTable,
    model: &str,
    train: &[SeriesFrame],
    seasonality: usize,
) -> Option<Vec<SeriesMetrics>> {
    let column = table.column(model)?;
    let mut pairs: HashMap<&str, Vec<(Option<f64>, Option<f64>)>> = HashMap::new();
    for row in &table.rows {
        pairs
            .entry(row.unique_id.as_str())
            .or_default()
            .push((row.y, row.predictions.get(column).copied().flatten()));
    }
    let history: HashMap<&str, &SeriesFrame> =
        train.iter().map(|f| (f.unique_id.as_str(), f)).collect();

    let metrics = table
        .series_ids()
        .iter()
        .map(|id| {
            let train_values = history.get(id.as_str()).map_or(&[][..], |f| &f.y[..]);
            let series_pairs = pairs.get(id.as_str()).map_or(&[][..], |p| &p[..]);
            series_metrics(id, series_pairs, train_values, seasonality)
        })
        .collect();
    Some(metrics)
}

/// Validated panel metrics of one model column
pub fn evaluate_model(
    dataset: &str,
    table: &ForecastTable,
    model: &str,
    aligned_train: &[SeriesFrame],
    seasonality: usize,
) -> Result<MetricSummary> {
    let series = model_series_metrics(table, model, aligned_train, seasonality).ok_or_else(|| {
        ForecastError::BackendFailure {
            dataset: dataset.to_string(),
            model: model.to_string(),
            message: "forecast table has no column for the model".to_string(),
        }
    })?;
    let summary = MetricSummary::from_series(model, &series);
    debug!(
        dataset,
        model,
        mase = summary.mase,
        mse = summary.mse,
        r2oos = summary.r2oos,
        series = summary.n_series,
        "model evaluated"
    );
    summary.validate(dataset)?;
    Ok(summary)
}

/// Metrics of every model column; columns that fail validation are
/// returned as errors alongside the others
pub fn evaluate_all(
    dataset: &str,
    table: &ForecastTable,
    aligned_train: &[SeriesFrame],
    seasonality: usize,
) -> Vec<(String, Result<MetricSummary>)> {
    table
        .model_names
        .iter()
        .map(|model| {
            (
                model.clone(),
                evaluate_model(dataset, table, model, aligned_train, seasonality),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn series_metrics_match_hand_computation() {
        let train = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let pairs = vec![(Some(5.0), Some(4.0)), (Some(6.0), Some(8.0)), (None, Some(1.0))];
        let m = series_metrics("a", &pairs, &train, 1);
        // mae 1.5 over naive scale 1.0
        assert_relative_eq!(m.mase.unwrap(), 1.5);
        assert_relative_eq!(m.mse.unwrap(), 2.5);
        // benchmark 2.5 predicts with mse (2.5^2 + 3.5^2) / 2 = 9.25
        assert_relative_eq!(m.r2oos.unwrap(), 1.0 - 2.5 / 9.25);
    }

    #[test]
    fn flat_history_leaves_mase_undefined() {
        let train = vec![Some(2.0); 6];
        let m = series_metrics("a", &[(Some(3.0), Some(2.0))], &train, 1);
        assert_eq!(m.mase, None);
        assert!(m.mse.is_some());
    }

    #[test]
    fn summary_skips_undefined_series() {
        let series = vec![
            SeriesMetrics {
                unique_id: "a".into(),
                mase: Some(1.0),
                mse: Some(4.0),
                r2oos: Some(-0.5),
            },
            SeriesMetrics {
                unique_id: "b".into(),
                mase: None,
                mse: Some(16.0),
                r2oos: Some(0.5),
            },
        ];
        let summary = MetricSummary::from_series("Theta", &series);
        assert_relative_eq!(summary.mase, 1.0);
        assert_relative_eq!(summary.mse, 10.0);
        assert_relative_eq!(summary.rmse, 10.0f64.sqrt());
        assert_relative_eq!(summary.r2oos, 0.0);
        assert_eq!(summary.n_valid_mase, 1);
        assert!(summary.validate("demo").is_ok());
    }

    #[test]
    fn zero_mase_is_rejected() {
        let summary = MetricSummary {
            model: "Naive".into(),
            mase: 0.0,
            mse: 1.0,
            rmse: 1.0,
            r2oos: 0.0,
            n_series: 1,
            n_valid_mase: 1,
        };
        match summary.validate("demo") {
            Err(ForecastError::MetricComputationError { field, .. }) => assert_eq!(field, "MASE"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nan_metric_is_rejected() {
        let summary = MetricSummary {
            model: "Naive".into(),
            mase: 1.0,
            mse: f64::NAN,
            rmse: f64::NAN,
            r2oos: 0.0,
            n_series: 1,
            n_valid_mase: 1,
        };
        assert!(summary.validate("demo").is_err());
    }

    #[test]
    fn alignment_cuts_each_series_at_its_cutoff() {
        let a = SeriesFrame::new(
            "a",
            vec![date(2020, 1, 31), date(2020, 2, 29), date(2020, 3, 31)],
            vec![Some(1.0), Some(2.0), Some(3.0)],
        );
        let b = SeriesFrame::new("b", vec![date(2019, 1, 31)], vec![Some(1.0)]);
        let c = SeriesFrame::new("c", vec![date(2019, 1, 31)], vec![Some(1.0)]);
        let cutoffs = HashMap::from([
            ("a".to_string(), date(2020, 2, 29)),
            ("b".to_string(), date(2019, 1, 31)),
        ]);
        let aligned = align_train(&[a, b, c], &cutoffs);
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[0].len(), 2);
        assert_eq!(aligned[1].len(), 1);
    }
}
