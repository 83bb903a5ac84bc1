//! Robust preprocessing: canonical grids, positional train/test split,
//! quality filtering and train-only imputation
//!
//! Stages, in order:
//!
//! 1. anchored frequencies snap timestamps to their period anchor
//! 2. every series is laid on its own grid from first to last timestamp
//! 3. the last `horizon` slots of each series are test
//! 4. series failing the [`QualityRequirements`] are rejected
//! 5. gap indicators are attached
//! 6. training gaps are imputed and the result validated

use crate::data::{frame_from_rows, Panel};
use crate::error::{ForecastError, Result};
use crate::frequency::Frequency;
use chrono::NaiveDate;
use ftsfr_math::stats::std_dev;
use ftsfr_models::SeriesFrame;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Full seasonal cycles a seasonal series needs in its training half
pub const MIN_SEASONS: usize = 2;

/// Imputed training values beyond this magnitude reject the series
const MAX_ABS_VALUE: f64 = 1e10;

/// Imputed training values with a smaller std reject the series
const MIN_IMPUTED_STD: f64 = 1e-15;

/// Base thresholds of one frequency family
#[derive(Debug, Clone, Copy, PartialEq)]
struct QualityBase {
    min_total: usize,
    min_train: usize,
    min_test: usize,
    train_ratio: f64,
    test_ratio: f64,
    variance_threshold: f64,
    max_gap_ratio: f64,
}

fn quality_base(frequency: Frequency) -> QualityBase {
    match frequency {
        Frequency::Daily | Frequency::BusinessDaily => QualityBase {
            min_total: 16,
            min_train: 12,
            min_test: 4,
            train_ratio: 0.5,
            test_ratio: 0.2,
            variance_threshold: 1e-3,
            max_gap_ratio: 0.7,
        },
        Frequency::QuarterEnd | Frequency::QuarterStart => QualityBase {
            min_total: 27,
            min_train: 18,
            min_test: 9,
            train_ratio: 1.0,
            test_ratio: 0.5,
            variance_threshold: 1e-2,
            max_gap_ratio: 0.6,
        },
        Frequency::YearEnd | Frequency::YearStart => QualityBase {
            min_total: 40,
            min_train: 30,
            min_test: 10,
            train_ratio: 1.0,
            test_ratio: 0.5,
            variance_threshold: 5e-2,
            max_gap_ratio: 0.6,
        },
        _ => QualityBase {
            min_total: 16,
            min_train: 12,
            min_test: 4,
            train_ratio: 0.75,
            test_ratio: 0.25,
            variance_threshold: 1e-3,
            max_gap_ratio: 0.6,
        },
    }
}

/// Effective per-series thresholds for a (frequency, horizon, seasonality)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityRequirements {
    pub min_total_obs: usize,
    pub min_train_obs: usize,
    pub min_test_obs: usize,
    pub variance_threshold: f64,
    pub max_gap_ratio: f64,
}

impl QualityRequirements {
    pub fn for_frequency(frequency: Frequency, horizon: usize, seasonality: usize) -> Self {
        Self::with_min_seasons(frequency, horizon, seasonality, MIN_SEASONS)
    }

    pub fn with_min_seasons(
        frequency: Frequency,
        horizon: usize,
        seasonality: usize,
        min_seasons: usize,
    ) -> Self {
        let base = quality_base(frequency);
        let h = horizon as f64;
        let seasonal_min = if seasonality > 1 {
            seasonality * min_seasons
        } else {
            0
        };
        let min_train_obs = base
            .min_train
            .max((h * base.train_ratio).ceil() as usize)
            .max(seasonal_min);
        let min_test_obs = base
            .min_test
            .max(horizon.min((h * base.test_ratio).ceil() as usize));
        let min_total_obs = base
            .min_total
            .max(min_train_obs + min_test_obs)
            .max(horizon + min_train_obs);
        Self {
            min_total_obs,
            min_train_obs,
            min_test_obs,
            variance_threshold: base.variance_threshold,
            max_gap_ratio: base.max_gap_ratio,
        }
    }
}

impl fmt::Display for QualityRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min_total_obs={} min_train_obs={} min_test_obs={} variance_threshold={} max_gap_ratio={}",
            self.min_total_obs,
            self.min_train_obs,
            self.min_test_obs,
            self.variance_threshold,
            self.max_gap_ratio
        )
    }
}

/// Why a series was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooShort,
    TooFewTrain,
    NearConstant,
    TooGappy,
    TooFewTest,
    FailedValidation,
}

/// Per-reason rejection counts of one preprocessing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub input_series: usize,
    pub too_short: usize,
    pub too_few_train: usize,
    pub near_constant: usize,
    pub too_gappy: usize,
    pub too_few_test: usize,
    pub failed_validation: usize,
    pub kept: usize,
}

impl FilterReport {
    fn record(&mut self, rejection: Rejection) {
        let slot = match rejection {
            Rejection::TooShort => &mut self.too_short,
            Rejection::TooFewTrain => &mut self.too_few_train,
            Rejection::NearConstant => &mut self.near_constant,
            Rejection::TooGappy => &mut self.too_gappy,
            Rejection::TooFewTest => &mut self.too_few_test,
            Rejection::FailedValidation => &mut self.failed_validation,
        };
        *slot += 1;
    }

    pub fn removed(&self) -> usize {
        self.input_series - self.kept
    }
}

impl fmt::Display for FilterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "kept {} of {} series (too short: {}, too few train: {}, near constant: {}, too gappy: {}, too few test: {}, failed validation: {})",
            self.kept,
            self.input_series,
            self.too_short,
            self.too_few_train,
            self.near_constant,
            self.too_gappy,
            self.too_few_test,
            self.failed_validation
        )
    }
}

/// A surviving series: imputed train half, raw test half and gap flags
/// over both halves
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSeries {
    pub train: SeriesFrame,
    pub test: SeriesFrame,
    /// `true` where the canonical slot had no value, train then test
    pub is_gap: Vec<bool>,
}

impl PreparedSeries {
    pub fn unique_id(&self) -> &str {
        &self.train.unique_id
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_value(&self) -> Vec<bool> {
        self.is_gap.iter().map(|g| !g).collect()
    }

    /// Train followed by test, as fed to cross-validation
    pub fn full(&self) -> SeriesFrame {
        let mut ds = self.train.ds.clone();
        ds.extend_from_slice(&self.test.ds);
        let mut y = self.train.y.clone();
        y.extend_from_slice(&self.test.y);
        SeriesFrame::new(self.train.unique_id.clone(), ds, y)
    }
}

/// Output of a preprocessing run
#[derive(Debug, Clone)]
pub struct PreparedPanel {
    pub dataset: String,
    pub frequency: Frequency,
    pub horizon: usize,
    pub seasonality: usize,
    pub requirements: QualityRequirements,
    pub report: FilterReport,
    pub series: Vec<PreparedSeries>,
}

impl PreparedPanel {
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn train_frames(&self) -> Vec<SeriesFrame> {
        self.series.iter().map(|s| s.train.clone()).collect()
    }

    pub fn test_frames(&self) -> Vec<SeriesFrame> {
        self.series.iter().map(|s| s.test.clone()).collect()
    }

    pub fn full_frames(&self) -> Vec<SeriesFrame> {
        self.series.iter().map(PreparedSeries::full).collect()
    }

    /// Canonical slots per series
    pub fn lengths(&self) -> Vec<usize> {
        self.series.iter().map(PreparedSeries::len).collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.series.iter().filter_map(|s| s.train.ds.first()).min()?;
        let end = self
            .series
            .iter()
            .filter_map(|s| s.test.ds.last().or(s.train.ds.last()))
            .max()?;
        Some((*start, *end))
    }

    pub fn no_valid_series(&self) -> ForecastError {
        ForecastError::NoValidSeries {
            dataset: self.dataset.clone(),
            frequency: self.frequency,
            horizon: self.horizon,
            requirements: self.requirements,
            report: self.report.clone(),
        }
    }
}

/// Configured preprocessing pipeline for one dataset
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    frequency: Frequency,
    seasonality: usize,
    horizon: usize,
    impute: bool,
    min_seasons: usize,
}

impl Preprocessor {
    /// Pipeline with the standard horizon of `frequency` and imputation on
    pub fn new(frequency: Frequency, seasonality: usize) -> Self {
        Self {
            frequency,
            seasonality: seasonality.max(1),
            horizon: frequency.horizon(),
            impute: true,
            min_seasons: MIN_SEASONS,
        }
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_imputation(mut self, impute: bool) -> Self {
        self.impute = impute;
        self
    }

    pub fn with_min_seasons(mut self, min_seasons: usize) -> Self {
        self.min_seasons = min_seasons;
        self
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn requirements(&self) -> QualityRequirements {
        QualityRequirements::with_min_seasons(
            self.frequency,
            self.horizon,
            self.seasonality,
            self.min_seasons,
        )
    }

    /// Run every stage; fails with `NoValidSeries` when nothing survives
    pub fn run(&self, panel: &Panel) -> Result<PreparedPanel> {
        let requirements = self.requirements();
        let mut report = FilterReport {
            input_series: panel.len(),
            ..FilterReport::default()
        };
        let mut series = Vec::with_capacity(panel.len());

        for raw in &panel.series {
            let normalized = normalize_series(raw, self.frequency);
            let grid = canonical_grid(&normalized, self.frequency);
            let (train, test) = split(&grid, self.horizon);

            if let Err(rejection) = check_quality(&train, &test, &requirements) {
                debug!(series = %raw.unique_id, ?rejection, "series rejected");
                report.record(rejection);
                continue;
            }

            let is_gap: Vec<bool> = grid.y.iter().map(Option::is_none).collect();
            let train = if self.impute {
                match impute_train(&train.y, self.seasonality) {
                    Some(values) if validate_imputed(&values) => SeriesFrame::new(
                        train.unique_id.clone(),
                        train.ds.clone(),
                        values.into_iter().map(Some).collect(),
                    ),
                    _ => {
                        debug!(series = %raw.unique_id, "imputed training values rejected");
                        report.record(Rejection::FailedValidation);
                        continue;
                    }
                }
            } else {
                train
            };
            series.push(PreparedSeries { train, test, is_gap });
        }
        report.kept = series.len();

        let prepared = PreparedPanel {
            dataset: panel.dataset.clone(),
            frequency: self.frequency,
            horizon: self.horizon,
            seasonality: self.seasonality,
            requirements,
            report,
            series,
        };
        if prepared.is_empty() {
            warn!(dataset = %panel.dataset, report = %prepared.report, "no series passed preprocessing");
            return Err(prepared.no_valid_series());
        }
        info!(
            dataset = %panel.dataset,
            frequency = %self.frequency,
            horizon = self.horizon,
            report = %prepared.report,
            "preprocessing finished"
        );
        Ok(prepared)
    }
}

/// Snap timestamps to the frequency anchor, collapsing duplicates to the
/// last value; identity for unanchored frequencies
pub fn normalize_series(series: &SeriesFrame, frequency: Frequency) -> SeriesFrame {
    if !frequency.is_anchored() {
        return series.clone();
    }
    let rows = series
        .ds
        .iter()
        .map(|ts| frequency.anchor(*ts))
        .zip(series.y.iter().copied())
        .collect();
    frame_from_rows(series.unique_id.clone(), rows)
}

/// Apply [`normalize_series`] to every series of a panel
pub fn normalize_panel(panel: &Panel, frequency: Frequency) -> Panel {
    Panel::new(
        panel.dataset.clone(),
        panel
            .series
            .iter()
            .map(|s| normalize_series(s, frequency))
            .collect(),
    )
}

/// Lay a series on its grid from first to last timestamp; gaps are null.
/// Timestamps off the grid are dropped.
pub fn canonical_grid(series: &SeriesFrame, frequency: Frequency) -> SeriesFrame {
    let (Some(first), Some(last)) = (series.ds.first(), series.ds.last()) else {
        return series.clone();
    };
    let observed: HashMap<NaiveDate, Option<f64>> = series
        .ds
        .iter()
        .copied()
        .zip(series.y.iter().copied())
        .collect();
    let off_grid = series
        .ds
        .iter()
        .filter(|ts| !frequency.is_on_grid(**ts))
        .count();
    if off_grid > 0 {
        debug!(series = %series.unique_id, off_grid, "timestamps off the grid dropped");
    }

    let ds = frequency.grid(*first, *last);
    let y = ds
        .iter()
        .map(|ts| observed.get(ts).copied().flatten())
        .collect();
    SeriesFrame::new(series.unique_id.clone(), ds, y)
}

/// Last `horizon` slots are test, by position on the grid
pub fn split(series: &SeriesFrame, horizon: usize) -> (SeriesFrame, SeriesFrame) {
    let at = series.len().saturating_sub(horizon);
    let train = SeriesFrame::new(
        series.unique_id.clone(),
        series.ds[..at].to_vec(),
        series.y[..at].to_vec(),
    );
    let test = SeriesFrame::new(
        series.unique_id.clone(),
        series.ds[at..].to_vec(),
        series.y[at..].to_vec(),
    );
    (train, test)
}

/// First failing requirement of a split series
pub fn check_quality(
    train: &SeriesFrame,
    test: &SeriesFrame,
    requirements: &QualityRequirements,
) -> std::result::Result<(), Rejection> {
    if train.len() + test.len() < requirements.min_total_obs {
        return Err(Rejection::TooShort);
    }
    let observed_train = train.observed();
    if observed_train < requirements.min_train_obs {
        return Err(Rejection::TooFewTrain);
    }
    let values: Vec<f64> = train.y.iter().flatten().copied().collect();
    if std_dev(&values, 1).unwrap_or(0.0) < requirements.variance_threshold {
        return Err(Rejection::NearConstant);
    }
    let gap_ratio = (train.len() - observed_train) as f64 / train.len() as f64;
    if gap_ratio > requirements.max_gap_ratio {
        return Err(Rejection::TooGappy);
    }
    if test.observed() < requirements.min_test_obs {
        return Err(Rejection::TooFewTest);
    }
    Ok(())
}

/// Fill training gaps: the value one season back when observed, else the
/// previous value; leading gaps take the first observed value
pub fn impute_train(values: &[Option<f64>], seasonality: usize) -> Option<Vec<f64>> {
    let mut filled = values.to_vec();
    if seasonality > 1 {
        for i in seasonality..values.len() {
            if filled[i].is_none() {
                filled[i] = values[i - seasonality];
            }
        }
    }
    ftsfr_math::transform::fill_missing(&filled).ok()
}

/// Finite, bounded and not constant
pub fn validate_imputed(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite() && v.abs() <= MAX_ABS_VALUE)
        && std_dev(values, 1).is_some_and(|s| s >= MIN_IMPUTED_STD)
}
