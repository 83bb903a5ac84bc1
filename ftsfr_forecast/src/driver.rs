//! One (dataset, model) benchmark run
//!
//! Resolve, check for a reusable result, load, preprocess, cross-validate a
//! single hold-out window, score, and write one result row.

use crate::config::Settings;
use crate::data::DataLoader;
use crate::error::{ForecastError, Result};
use crate::factory::{build_model, ModelInstance};
use crate::metrics::{align_train, evaluate_model, MetricSummary};
use crate::preprocess::{PreparedPanel, Preprocessor};
use crate::registry::{DatasetCatalog, DatasetSpec, ModelCatalog, ModelSpec};
use crate::results::{check_existing, write_result, MetricRow, SkipCheck};
use ftsfr_models::models::{ForecastModel, HistoricAverage, SeasonalNaive};
use ftsfr_models::{CrossValidation, ForecastTable, SeriesFrame};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Symbolic name of the historic-average baseline
pub const BASELINE_MODEL: &str = "historic_average";

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A valid result already existed and was left untouched
    Skipped { path: PathBuf, row: MetricRow },
    Completed { path: PathBuf, row: MetricRow },
}

impl RunOutcome {
    pub fn row(&self) -> &MetricRow {
        match self {
            RunOutcome::Skipped { row, .. } | RunOutcome::Completed { row, .. } => row,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            RunOutcome::Skipped { path, .. } | RunOutcome::Completed { path, .. } => path,
        }
    }
}

/// Settings plus both catalogs
#[derive(Debug, Clone)]
pub struct Harness {
    pub settings: Settings,
    pub datasets: DatasetCatalog,
    pub models: ModelCatalog,
}

impl Harness {
    pub fn new(settings: Settings, datasets: DatasetCatalog, models: ModelCatalog) -> Self {
        Self {
            settings,
            datasets,
            models,
        }
    }

    /// Load the catalogs named by `settings`
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let datasets = DatasetCatalog::load(&settings.dataset_catalog, &settings.data_dir)?;
        let models = ModelCatalog::load(&settings.model_catalog)?;
        Ok(Self::new(settings, datasets, models))
    }

    /// Benchmark `model` on `dataset`
    pub fn forecast(&self, dataset: &str, model: &str) -> Result<RunOutcome> {
        let dataset_spec = self.datasets.resolve(dataset)?;
        let model_spec = self.models.resolve(model)?;
        let path = self.settings.result_path(dataset, model);

        match check_existing(&path) {
            SkipCheck::Skip(row) => {
                info!(
                    "skipping {}/{}: valid result exists at {}",
                    dataset,
                    model,
                    path.display()
                );
                return Ok(RunOutcome::Skipped { path, row });
            }
            SkipCheck::Proceed(reason) => {
                info!(dataset, model, %reason, "running forecast");
            }
        }

        let started = Instant::now();
        let panel = DataLoader::load(dataset_spec)?;
        let prepared = Preprocessor::new(dataset_spec.frequency, dataset_spec.seasonality).run(&panel)?;
        let horizon = prepared.horizon;
        let frames = cv_frames(&prepared)?;

        let instance = build_model(model_spec, dataset_spec, horizon, &self.settings)?;
        let primary = instance.column_name().to_string();
        let (table, baseline_seconds) = match instance {
            ModelInstance::Statistical(model) => {
                self.statistical_table(dataset_spec, model_spec, model, &frames, horizon)?
            }
            ModelInstance::Neural(auto) => {
                self.neural_table(dataset_spec, model_spec, auto, &frames, horizon)?
            }
        };

        let summaries = self.evaluate(dataset_spec, &prepared, table, &primary)?;
        let elapsed = started.elapsed().as_secs_f64();

        let row = metric_row(&model_spec.name, dataset, &summaries.primary, elapsed);
        write_result(&path, &row)?;
        info!(
            dataset,
            model,
            mase = row.mase,
            rmse = row.rmse,
            r2oos = row.r2oos,
            seconds = elapsed,
            path = %path.display(),
            "result written"
        );

        // the primary result is already on disk, so a failure here only loses the side row
        if let (Some(baseline), Some(seconds)) = (summaries.baseline, baseline_seconds) {
            if let Err(e) = self.write_baseline(dataset, &baseline, seconds) {
                warn!(dataset, model = BASELINE_MODEL, error = %e, "baseline result not written");
            }
        }
        Ok(RunOutcome::Completed { path, row })
    }

    fn statistical_table(
        &self,
        dataset: &DatasetSpec,
        spec: &ModelSpec,
        model: Box<dyn ForecastModel>,
        frames: &[SeriesFrame],
        horizon: usize,
    ) -> Result<(ForecastTable, Option<f64>)> {
        let backend = |e: ftsfr_models::ModelError| backend_failure(dataset, spec, e);
        let is_baseline = model.name() == HistoricAverage::new().name();
        let naive = SeasonalNaive::new(dataset.seasonality).map_err(backend)?;
        let fallback = Some(&naive as &dyn ForecastModel);
        let cv = CrossValidation::single_window(horizon).map_err(backend)?;
        let mut table = cv.run(frames, &[model], fallback).map_err(backend)?;
        if is_baseline {
            return Ok((table, None));
        }
        let (baseline, seconds) = baseline_pass(&cv, frames, fallback).map_err(backend)?;
        table.left_join(&baseline);
        Ok((table, Some(seconds)))
    }

    fn neural_table(
        &self,
        dataset: &DatasetSpec,
        spec: &ModelSpec,
        mut auto: ftsfr_neural::AutoNeural,
        frames: &[SeriesFrame],
        horizon: usize,
    ) -> Result<(ForecastTable, Option<f64>)> {
        info!(
            dataset = %dataset.name,
            model = %spec.name,
            accelerator = %auto.accelerator(),
            "starting hyperparameter search"
        );
        let mut table = auto
            .cross_validation(frames)
            .map_err(|e| backend_failure(dataset, spec, e))?;
        if let Some(params) = auto.best_params() {
            info!(dataset = %dataset.name, model = %spec.name, ?params, "best configuration");
        }

        if !self.settings.include_baselines {
            return Ok((table, None));
        }
        let backend = |e: ftsfr_models::ModelError| backend_failure(dataset, spec, e);
        let cv = CrossValidation::single_window(horizon).map_err(backend)?;
        let (baseline, seconds) = baseline_pass(&cv, frames, None).map_err(backend)?;
        table.left_join(&baseline);
        let naive: Vec<Box<dyn ForecastModel>> =
            vec![Box::new(SeasonalNaive::new(dataset.seasonality).map_err(backend)?)];
        table.left_join(&cv.run(frames, &naive, None).map_err(backend)?);
        Ok((table, Some(seconds)))
    }

    fn evaluate(
        &self,
        dataset: &DatasetSpec,
        prepared: &PreparedPanel,
        mut table: ForecastTable,
        primary: &str,
    ) -> Result<Summaries> {
        table.nan_to_null();
        let aligned = align_train(&prepared.train_frames(), &table.cutoffs());

        let primary_summary = evaluate_model(&dataset.name, &table, primary, &aligned, dataset.seasonality)?;
        let mut baseline = None;
        for column in table.model_names.iter().filter(|c| c.as_str() != primary) {
            match evaluate_model(&dataset.name, &table, column, &aligned, dataset.seasonality) {
                Ok(summary) => {
                    info!(
                        dataset = %dataset.name,
                        baseline = %column,
                        mase = summary.mase,
                        r2oos = summary.r2oos,
                        "baseline evaluated"
                    );
                    if column == HistoricAverage::new().name() {
                        baseline = Some(summary);
                    }
                }
                Err(e) => warn!(dataset = %dataset.name, baseline = %column, error = %e, "baseline metrics unavailable"),
            }
        }
        Ok(Summaries {
            primary: primary_summary,
            baseline,
        })
    }

    /// Historic-average result written alongside any other model, unless
    /// a valid one is already there
    fn write_baseline(&self, dataset: &str, summary: &MetricSummary, seconds: f64) -> Result<()> {
        let path = self.settings.result_path(dataset, BASELINE_MODEL);
        if check_existing(&path).should_skip() {
            return Ok(());
        }
        write_result(&path, &metric_row(BASELINE_MODEL, dataset, summary, seconds))?;
        info!(dataset, path = %path.display(), "baseline result written");
        Ok(())
    }
}

struct Summaries {
    primary: MetricSummary,
    baseline: Option<MetricSummary>,
}

/// Historic-average cross-validation on its own, with its wall time in
/// seconds
fn baseline_pass(
    cv: &CrossValidation,
    frames: &[SeriesFrame],
    fallback: Option<&dyn ForecastModel>,
) -> ftsfr_models::Result<(ForecastTable, f64)> {
    let started = Instant::now();
    let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(HistoricAverage::new())];
    let table = cv.run(frames, &models, fallback)?;
    Ok((table, started.elapsed().as_secs_f64()))
}

/// Full frames for cross-validation; series with no room for a hold-out
/// window are dropped
fn cv_frames(prepared: &PreparedPanel) -> Result<Vec<SeriesFrame>> {
    let min_len = prepared.horizon + 1;
    let frames: Vec<SeriesFrame> = prepared
        .full_frames()
        .into_iter()
        .filter(|frame| {
            let keep = frame.len() >= min_len;
            if !keep {
                warn!(
                    dataset = %prepared.dataset,
                    series = %frame.unique_id,
                    length = frame.len(),
                    required = min_len,
                    "series shorter than horizon + 1, dropped"
                );
            }
            keep
        })
        .collect();
    if frames.is_empty() {
        return Err(prepared.no_valid_series());
    }
    Ok(frames)
}

fn metric_row(model: &str, dataset: &str, summary: &MetricSummary, elapsed: f64) -> MetricRow {
    MetricRow {
        model_name: model.to_string(),
        dataset_name: dataset.to_string(),
        mase: summary.mase,
        mse: summary.mse,
        rmse: summary.rmse,
        r2oos: summary.r2oos,
        time_taken: elapsed,
    }
}

fn backend_failure(dataset: &DatasetSpec, spec: &ModelSpec, err: impl std::fmt::Display) -> ForecastError {
    ForecastError::BackendFailure {
        dataset: dataset.name.clone(),
        model: spec.name.clone(),
        message: err.to_string(),
    }
}
