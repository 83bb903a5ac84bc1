//! Long-format series and forecast tables shared by every backend

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One series on its canonical grid; `y` is null at gaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFrame {
    pub unique_id: String,
    pub ds: Vec<NaiveDate>,
    pub y: Vec<Option<f64>>,
}

impl SeriesFrame {
    pub fn new(unique_id: impl Into<String>, ds: Vec<NaiveDate>, y: Vec<Option<f64>>) -> Self {
        Self {
            unique_id: unique_id.into(),
            ds,
            y,
        }
    }

    pub fn len(&self) -> usize {
        self.ds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ds.is_empty()
    }

    /// Number of non-null observations
    pub fn observed(&self) -> usize {
        self.y.iter().filter(|v| v.is_some()).count()
    }

    /// Last timestamp of the series
    pub fn last_ds(&self) -> Option<NaiveDate> {
        self.ds.last().copied()
    }
}

/// One test slot of one series for one cross-validation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub unique_id: String,
    pub ds: NaiveDate,
    /// Last training timestamp of this series in this window
    pub cutoff: NaiveDate,
    /// Actual value, null when the test slot is a gap
    pub y: Option<f64>,
    /// One prediction per model column of the owning table
    pub predictions: Vec<Option<f64>>,
}

/// Forecast rows with named model columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    pub model_names: Vec<String>,
    pub rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn new(model_names: Vec<String>) -> Self {
        Self {
            model_names,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a model column
    pub fn column(&self, model: &str) -> Option<usize> {
        self.model_names.iter().position(|m| m == model)
    }

    /// Predictions of one model column, row-aligned
    pub fn predictions(&self, model: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column(model)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.predictions.get(idx).copied().flatten())
                .collect(),
        )
    }

    /// Turn every non-finite prediction into a null
    pub fn nan_to_null(&mut self) {
        for row in &mut self.rows {
            for p in &mut row.predictions {
                if matches!(p, Some(v) if !v.is_finite()) {
                    *p = None;
                }
            }
        }
    }

    /// Series ids in first-seen order
    pub fn series_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(r.unique_id.as_str()))
            .map(|r| r.unique_id.clone())
            .collect()
    }

    /// Latest cutoff per series
    pub fn cutoffs(&self) -> HashMap<String, NaiveDate> {
        let mut out: HashMap<String, NaiveDate> = HashMap::new();
        for row in &self.rows {
            out.entry(row.unique_id.clone())
                .and_modify(|c| {
                    if row.cutoff > *c {
                        *c = row.cutoff;
                    }
                })
                .or_insert(row.cutoff);
        }
        out
    }

    /// Left join the model columns of `other` on `(unique_id, ds)`; rows of
    /// `self` with no match get nulls. Columns already present are skipped.
    pub fn left_join(&mut self, other: &ForecastTable) {
        let new_cols: Vec<(usize, String)> = other
            .model_names
            .iter()
            .enumerate()
            .filter(|(_, name)| self.column(name).is_none())
            .map(|(i, name)| (i, name.clone()))
            .collect();
        if new_cols.is_empty() {
            return;
        }

        let index: HashMap<(&str, NaiveDate), &ForecastRow> = other
            .rows
            .iter()
            .map(|r| ((r.unique_id.as_str(), r.ds), r))
            .collect();

        for row in &mut self.rows {
            let matched = index.get(&(row.unique_id.as_str(), row.ds));
            for (i, _) in &new_cols {
                let value = matched.and_then(|m| m.predictions.get(*i).copied().flatten());
                row.predictions.push(value);
            }
        }
        self.model_names
            .extend(new_cols.into_iter().map(|(_, name)| name));
    }
}
