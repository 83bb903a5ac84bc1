//! Canonical panel loading
//!
//! A dataset parquet is reduced to `(series_id, timestamp, value)`: a legacy
//! `id` column is renamed, index-level extras are dropped, values are cast to
//! float32 and non-finite values become nulls.

use crate::error::{ForecastError, Result};
use crate::registry::DatasetSpec;
use chrono::{Datelike, NaiveDate};
use ftsfr_models::SeriesFrame;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

pub const SERIES_ID: &str = "series_id";
pub const TIMESTAMP: &str = "timestamp";
pub const VALUE: &str = "value";
const LEGACY_ID: &str = "id";

/// Days from 0001-01-01 to 1970-01-01
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Series of one dataset, ordered by `series_id`; each is sorted by
/// timestamp with at most one row per timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub dataset: String,
    pub series: Vec<SeriesFrame>,
}

impl Panel {
    pub fn new(dataset: impl Into<String>, series: Vec<SeriesFrame>) -> Self {
        Self {
            dataset: dataset.into(),
            series,
        }
    }

    /// Number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Rows per series
    pub fn lengths(&self) -> Vec<usize> {
        self.series.iter().map(SeriesFrame::len).collect()
    }

    /// Earliest and latest timestamp over all series
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.series.iter().filter_map(|s| s.ds.first()).min()?;
        let end = self.series.iter().filter_map(|s| s.ds.last()).max()?;
        Some((*start, *end))
    }

    pub fn n_observed(&self) -> usize {
        self.series.iter().map(SeriesFrame::observed).sum()
    }
}

/// Loader for dataset parquet files
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load the parquet of a catalog entry
    pub fn load(spec: &DatasetSpec) -> Result<Panel> {
        let panel = Self::from_parquet(&spec.path, &spec.name)?;
        info!(
            dataset = %spec.name,
            series = panel.len(),
            observations = panel.n_observed(),
            "panel loaded"
        );
        Ok(panel)
    }

    pub fn from_parquet<P: AsRef<Path>>(path: P, dataset: &str) -> Result<Panel> {
        let path = path.as_ref();
        let unavailable = |reason: String| ForecastError::DataUnavailable {
            dataset: dataset.to_string(),
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| unavailable(e.to_string()))?;
        if df.height() == 0 {
            return Err(unavailable("parquet has no rows".to_string()));
        }
        Self::from_dataframe(df, dataset)
    }

    /// Normalise a data frame to a panel
    pub fn from_dataframe(mut df: DataFrame, dataset: &str) -> Result<Panel> {
        let schema_error = |message: String| ForecastError::SchemaError {
            dataset: dataset.to_string(),
            message,
        };

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        if !names.iter().any(|n| n == SERIES_ID) && names.iter().any(|n| n == LEGACY_ID) {
            df.rename(LEGACY_ID, SERIES_ID)?;
        }
        for required in [SERIES_ID, TIMESTAMP, VALUE] {
            if df.column(required).is_err() {
                return Err(schema_error(format!(
                    "missing required column '{}' (found: {})",
                    required,
                    names.join(", ")
                )));
            }
        }
        let df = df.select([SERIES_ID, TIMESTAMP, VALUE])?;

        let ids = df
            .column(SERIES_ID)?
            .cast(&DataType::Utf8)
            .map_err(|e| schema_error(format!("series_id: {}", e)))?;
        let timestamps = timestamp_dates(df.column(TIMESTAMP)?)
            .map_err(|e| schema_error(format!("timestamp: {}", e)))?;
        let values = df
            .column(VALUE)?
            .cast(&DataType::Float32)
            .map_err(|e| schema_error(format!("value: {}", e)))?;

        let mut grouped: BTreeMap<String, Vec<(NaiveDate, Option<f64>)>> = BTreeMap::new();
        let mut dropped = 0usize;
        for ((id, ts), value) in ids.utf8()?.into_iter().zip(timestamps).zip(values.f32()?) {
            let (Some(id), Some(ts)) = (id, ts) else {
                dropped += 1;
                continue;
            };
            let value = value.filter(|v| v.is_finite()).map(f64::from);
            grouped.entry(id.to_string()).or_default().push((ts, value));
        }
        if dropped > 0 {
            debug!(dataset, dropped, "rows without series_id or timestamp dropped");
        }

        let series = grouped
            .into_iter()
            .map(|(id, rows)| frame_from_rows(id, rows))
            .collect();
        Ok(Panel::new(dataset, series))
    }
}

/// Sort by timestamp; a repeated timestamp keeps its last value
pub(crate) fn frame_from_rows(id: String, mut rows: Vec<(NaiveDate, Option<f64>)>) -> SeriesFrame {
    rows.sort_by_key(|(ts, _)| *ts);
    let mut ds: Vec<NaiveDate> = Vec::with_capacity(rows.len());
    let mut y: Vec<Option<f64>> = Vec::with_capacity(rows.len());
    for (ts, value) in rows {
        if ds.last() == Some(&ts) {
            if let Some(last) = y.last_mut() {
                *last = value;
            }
        } else {
            ds.push(ts);
            y.push(value);
        }
    }
    SeriesFrame::new(id, ds, y)
}

fn timestamp_dates(column: &Series) -> PolarsResult<Vec<Option<NaiveDate>>> {
    match column.dtype() {
        DataType::Utf8 => Ok(column
            .utf8()?
            .into_iter()
            .map(|s| s.and_then(parse_date))
            .collect()),
        DataType::Date | DataType::Datetime(_, _) => {
            let days = column.cast(&DataType::Date)?.cast(&DataType::Int32)?;
            let dates = days.i32()?.into_iter().map(|d| d.and_then(days_to_date)).collect();
            Ok(dates)
        }
        other => Err(PolarsError::ComputeError(
            format!("unsupported type {}", other).into(),
        )),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Write a panel in the canonical parquet layout
pub fn write_parquet<P: AsRef<Path>>(panel: &Panel, path: P) -> Result<()> {
    let mut ids: Vec<&str> = Vec::new();
    let mut days: Vec<i32> = Vec::new();
    let mut values: Vec<Option<f32>> = Vec::new();
    for frame in &panel.series {
        for (ts, value) in frame.ds.iter().zip(&frame.y) {
            ids.push(&frame.unique_id);
            days.push(date_to_days(*ts));
            values.push(value.map(|v| v as f32));
        }
    }
    let timestamps = Series::new(TIMESTAMP, days).cast(&DataType::Date)?;
    let mut df = DataFrame::new(vec![
        Series::new(SERIES_ID, ids),
        timestamps,
        Series::new(VALUE, values),
    ])?;

    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    ParquetWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn epoch_conversion_round_trips() {
        assert_eq!(days_to_date(0), Some(date(1970, 1, 1)));
        assert_eq!(date_to_days(date(2000, 1, 31)), 10987);
    }

    #[test]
    fn legacy_id_column_is_renamed() {
        let df = df!(
            "id" => &["a", "a", "b"],
            "timestamp" => &["2020-01-31", "2020-02-29", "2020-01-31"],
            "value" => &[1.0f64, 2.0, 3.0],
            "__index_level_0__" => &[0i64, 1, 2]
        )
        .unwrap();
        let panel = DataLoader::from_dataframe(df, "demo").unwrap();
        assert_eq!(panel.len(), 2);
        assert_eq!(panel.series[0].unique_id, "a");
        assert_eq!(panel.series[0].y, vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn non_finite_values_become_null() {
        let df = df!(
            "series_id" => &["a", "a", "a"],
            "timestamp" => &["2020-01-31", "2020-02-29", "2020-03-31"],
            "value" => &[f64::NAN, f64::INFINITY, 4.0]
        )
        .unwrap();
        let panel = DataLoader::from_dataframe(df, "demo").unwrap();
        assert_eq!(panel.series[0].y, vec![None, None, Some(4.0)]);
    }

    #[test]
    fn missing_value_column_is_schema_error() {
        let df = df!(
            "series_id" => &["a"],
            "timestamp" => &["2020-01-31"]
        )
        .unwrap();
        assert!(matches!(
            DataLoader::from_dataframe(df, "demo"),
            Err(ForecastError::SchemaError { .. })
        ));
    }

    #[test]
    fn duplicate_timestamps_keep_last() {
        let frame = frame_from_rows(
            "a".to_string(),
            vec![
                (date(2020, 2, 29), Some(2.0)),
                (date(2020, 1, 31), Some(1.0)),
                (date(2020, 2, 29), Some(5.0)),
            ],
        );
        assert_eq!(frame.ds, vec![date(2020, 1, 31), date(2020, 2, 29)]);
        assert_eq!(frame.y, vec![Some(1.0), Some(5.0)]);
    }

    #[test]
    fn missing_file_is_unavailable() {
        assert!(matches!(
            DataLoader::from_parquet("/nonexistent/ftsfr_x.parquet", "ftsfr_x"),
            Err(ForecastError::DataUnavailable { .. })
        ));
    }
}
