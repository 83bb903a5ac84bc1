//! Assembles every result file into `results_all.csv` and a LaTeX summary,
//! and reports the quality of what it found

use crate::error::Result;
use crate::latex::{escape, number, LatexTable};
use crate::results::RESULT_COLUMNS;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const TOP_N: usize = 5;

/// A result row as found on disk; metric cells are kept as text so that
/// error markers survive into the combined table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub model_name: String,
    pub dataset_name: String,
    #[serde(rename = "MASE")]
    pub mase: String,
    #[serde(rename = "MSE")]
    pub mse: String,
    #[serde(rename = "RMSE")]
    pub rmse: String,
    #[serde(rename = "R2oos")]
    pub r2oos: String,
    #[serde(default)]
    pub time_taken: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Mase,
    Mse,
    Rmse,
    R2oos,
    TimeTaken,
}

impl Column {
    pub const NUMERIC: [Column; 5] = [
        Column::Mase,
        Column::Mse,
        Column::Rmse,
        Column::R2oos,
        Column::TimeTaken,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Mase => "MASE",
            Column::Mse => "MSE",
            Column::Rmse => "RMSE",
            Column::R2oos => "R2oos",
            Column::TimeTaken => "time_taken",
        }
    }
}

impl ResultRecord {
    pub fn cell(&self, column: Column) -> &str {
        match column {
            Column::Mase => &self.mase,
            Column::Mse => &self.mse,
            Column::Rmse => &self.rmse,
            Column::R2oos => &self.r2oos,
            Column::TimeTaken => &self.time_taken,
        }
    }

    /// Parsed cell, `None` when empty or not a number
    pub fn value(&self, column: Column) -> Option<f64> {
        self.cell(column).trim().parse().ok()
    }
}

/// Read every `<dataset>/<model>.csv` under `error_metrics_dir`, sorted by
/// (model, dataset). A missing directory yields no rows.
pub fn collect_results(error_metrics_dir: &Path) -> Result<Vec<ResultRecord>> {
    if !error_metrics_dir.is_dir() {
        warn!(dir = %error_metrics_dir.display(), "no error_metrics directory");
        return Ok(Vec::new());
    }
    let mut records = Vec::new();
    for dataset_dir in sorted_entries(error_metrics_dir)? {
        if !dataset_dir.is_dir() {
            continue;
        }
        for file in sorted_entries(&dataset_dir)? {
            if file.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            match read_first_record(&file) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => warn!(file = %file.display(), "result file has no rows"),
                Err(e) => warn!(file = %file.display(), error = %e, "result file unreadable"),
            }
        }
    }
    records.sort_by(|a, b| {
        (&a.model_name, &a.dataset_name).cmp(&(&b.model_name, &b.dataset_name))
    });
    Ok(records)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

fn read_first_record(path: &Path) -> Result<Option<ResultRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = reader.deserialize::<ResultRecord>();
    let first = match rows.next() {
        Some(row) => row?,
        None => return Ok(None),
    };
    let extra = rows.count();
    if extra > 0 {
        warn!(file = %path.display(), extra, "result file has more than one row, keeping the first");
    }
    Ok(Some(first))
}

/// MASE statistics of one model across datasets
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub n_datasets: usize,
}

pub fn summarize_by_model(records: &[ResultRecord]) -> Vec<ModelSummary> {
    let mut by_model: BTreeMap<&str, Vec<&ResultRecord>> = BTreeMap::new();
    for record in records {
        by_model.entry(&record.model_name).or_default().push(record);
    }
    by_model
        .into_iter()
        .map(|(model, rows)| {
            let mase: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.value(Column::Mase))
                .filter(|v| v.is_finite())
                .collect();
            let datasets: BTreeSet<&str> = rows.iter().map(|r| r.dataset_name.as_str()).collect();
            let present = !mase.is_empty();
            ModelSummary {
                model: model.to_string(),
                count: mase.len(),
                mean: present.then(|| mase.iter().mean()),
                std: (mase.len() > 1).then(|| mase.iter().std_dev()),
                min: present.then(|| Statistics::min(mase.iter())),
                max: present.then(|| Statistics::max(mase.iter())),
                n_datasets: datasets.len(),
            }
        })
        .collect()
}

/// Counts of suspicious cells in one column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnQuality {
    pub column: &'static str,
    pub missing: usize,
    pub errors: usize,
    pub negative: usize,
    pub infinite: usize,
    pub zero: usize,
}

pub fn quality_sweep(records: &[ResultRecord]) -> Vec<ColumnQuality> {
    Column::NUMERIC
        .iter()
        .map(|column| {
            let mut quality = ColumnQuality {
                column: column.name(),
                ..ColumnQuality::default()
            };
            for record in records {
                let cell = record.cell(*column).trim();
                if cell.is_empty() {
                    quality.missing += 1;
                } else if cell.contains("Error") {
                    quality.errors += 1;
                }
                match record.value(*column) {
                    Some(v) if v.is_infinite() => quality.infinite += 1,
                    Some(v) if v < 0.0 => quality.negative += 1,
                    Some(v) if v == 0.0 => quality.zero += 1,
                    _ => {}
                }
            }
            quality
        })
        .collect()
}

/// Models ranked by mean MASE: best first, then worst first
pub fn rank_models(summaries: &[ModelSummary]) -> (Vec<(String, f64)>, Vec<(String, f64)>) {
    let mut ranked: Vec<(String, f64)> = summaries
        .iter()
        .filter_map(|s| s.mean.map(|m| (s.model.clone(), m)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    let best = ranked.iter().take(TOP_N).cloned().collect();
    let worst = ranked.iter().rev().take(TOP_N).cloned().collect();
    (best, worst)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingSummary {
    pub total: f64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// (model, dataset, seconds), slowest first
    pub slowest: Vec<(String, String, f64)>,
}

pub fn timing_summary(records: &[ResultRecord]) -> Option<TimingSummary> {
    let mut timed: Vec<(String, String, f64)> = records
        .iter()
        .filter_map(|r| {
            let t = r.value(Column::TimeTaken).filter(|t| t.is_finite())?;
            Some((r.model_name.clone(), r.dataset_name.clone(), t))
        })
        .collect();
    if timed.is_empty() {
        return None;
    }
    let times: Vec<f64> = timed.iter().map(|(_, _, t)| *t).collect();
    timed.sort_by(|a, b| b.2.total_cmp(&a.2));
    timed.truncate(TOP_N);
    Some(TimingSummary {
        total: times.iter().sum(),
        mean: times.iter().mean(),
        median: Data::new(times.clone()).median(),
        min: Statistics::min(times.iter()),
        max: Statistics::max(times.iter()),
        slowest: timed,
    })
}

/// Render the per-model LaTeX summary
pub fn summary_latex(summaries: &[ModelSummary]) -> String {
    let mut table = LatexTable::new(
        "Forecasting performance by model (MASE across datasets)",
        "tab:results_all",
        "lrrrrrr",
        &["Model", "Count", "Mean", "Std", "Min", "Max", "Datasets"],
    );
    let rows = summaries
        .iter()
        .map(|s| {
            vec![
                escape(&s.model),
                s.count.to_string(),
                number(s.mean, 3),
                number(s.std, 3),
                number(s.min, 3),
                number(s.max, 3),
                s.n_datasets.to_string(),
            ]
        })
        .collect();
    table.section(None, rows);
    table.render()
}

/// Everything the aggregator computed
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub records: Vec<ResultRecord>,
    pub summaries: Vec<ModelSummary>,
    pub quality: Vec<ColumnQuality>,
    pub timing: Option<TimingSummary>,
    pub csv_path: PathBuf,
    pub tex_path: PathBuf,
}

/// Walk `<forecasting_dir>/error_metrics` and write
/// `results_all.{csv,tex}` next to it
pub fn aggregate(forecasting_dir: &Path) -> Result<AggregateReport> {
    let records = collect_results(&forecasting_dir.join("error_metrics"))?;
    fs::create_dir_all(forecasting_dir)?;

    let csv_path = forecasting_dir.join("results_all.csv");
    // header written by hand so an empty tree still yields one
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&csv_path)?;
    writer.write_record(RESULT_COLUMNS)?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    let summaries = summarize_by_model(&records);
    let tex_path = forecasting_dir.join("results_all.tex");
    fs::write(&tex_path, summary_latex(&summaries))?;

    let quality = quality_sweep(&records);
    let timing = timing_summary(&records);
    let report = AggregateReport {
        records,
        summaries,
        quality,
        timing,
        csv_path,
        tex_path,
    };
    log_report(&report);
    Ok(report)
}

fn log_report(report: &AggregateReport) {
    let n_datasets: BTreeSet<&str> = report
        .records
        .iter()
        .map(|r| r.dataset_name.as_str())
        .collect();
    info!(
        rows = report.records.len(),
        models = report.summaries.len(),
        datasets = n_datasets.len(),
        csv = %report.csv_path.display(),
        tex = %report.tex_path.display(),
        "results aggregated"
    );
    for q in &report.quality {
        if q.missing + q.errors + q.negative + q.infinite + q.zero > 0 {
            info!(
                column = q.column,
                missing = q.missing,
                errors = q.errors,
                negative = q.negative,
                infinite = q.infinite,
                zero = q.zero,
                "data quality"
            );
        }
    }
    let (best, worst) = rank_models(&report.summaries);
    for (rank, (model, mase)) in best.iter().enumerate() {
        info!(rank = rank + 1, model = %model, mean_mase = mase, "best performer");
    }
    for (rank, (model, mase)) in worst.iter().enumerate() {
        info!(rank = rank + 1, model = %model, mean_mase = mase, "worst performer");
    }
    if let Some(t) = &report.timing {
        info!(
            total = t.total,
            mean = t.mean,
            median = t.median,
            min = t.min,
            max = t.max,
            "timing (seconds)"
        );
        for (model, dataset, secs) in &t.slowest {
            info!(model = %model, dataset = %dataset, seconds = secs, "slow run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn record(model: &str, dataset: &str, mase: &str, time: &str) -> ResultRecord {
        ResultRecord {
            model_name: model.to_string(),
            dataset_name: dataset.to_string(),
            mase: mase.to_string(),
            mse: "1.0".to_string(),
            rmse: "1.0".to_string(),
            r2oos: "-0.2".to_string(),
            time_taken: time.to_string(),
        }
    }

    #[test]
    fn summary_per_model() {
        let records = vec![
            record("theta", "ftsfr_a", "1.0", "1"),
            record("theta", "ftsfr_b", "3.0", "2"),
            record("ses", "ftsfr_a", "Error", "3"),
        ];
        let summaries = summarize_by_model(&records);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].model, "ses");
        assert_eq!(summaries[0].count, 0);
        assert_eq!(summaries[0].mean, None);
        assert_eq!(summaries[0].n_datasets, 1);
        let theta = &summaries[1];
        assert_relative_eq!(theta.mean.unwrap(), 2.0);
        assert_relative_eq!(theta.std.unwrap(), 2.0f64.sqrt());
        assert_eq!(theta.min, Some(1.0));
        assert_eq!(theta.max, Some(3.0));
    }

    #[test]
    fn sweep_counts_markers() {
        let records = vec![
            record("theta", "ftsfr_a", "Error", "1"),
            record("theta", "ftsfr_b", "", "0"),
            record("theta", "ftsfr_c", "inf", "2"),
        ];
        let quality = quality_sweep(&records);
        let mase = &quality[0];
        assert_eq!((mase.missing, mase.errors, mase.infinite), (1, 1, 1));
        let r2 = &quality[3];
        assert_eq!(r2.negative, 3);
        let time = &quality[4];
        assert_eq!(time.zero, 1);
    }

    #[test]
    fn timing_ranks_slowest() {
        let records = vec![
            record("a", "d1", "1", "4"),
            record("b", "d1", "1", "1"),
            record("c", "d1", "1", "10"),
        ];
        let timing = timing_summary(&records).unwrap();
        assert_relative_eq!(timing.total, 15.0);
        assert_relative_eq!(timing.median, 4.0);
        assert_eq!(timing.slowest[0].0, "c");
    }

    #[test]
    fn empty_tree_still_writes_header() {
        let tmp = tempfile::tempdir().unwrap();
        let report = aggregate(tmp.path()).unwrap();
        assert!(report.records.is_empty());
        assert!(report.timing.is_none());
        let csv = fs::read_to_string(&report.csv_path).unwrap();
        assert_eq!(csv, "model_name,dataset_name,MASE,MSE,RMSE,R2oos,time_taken\n");
    }

    #[test]
    fn ranking_orders_by_mean() {
        let records = vec![
            record("a", "d1", "2.0", "1"),
            record("b", "d1", "0.5", "1"),
            record("c", "d1", "1.0", "1"),
        ];
        let (best, worst) = rank_models(&summarize_by_model(&records));
        assert_eq!(best[0].0, "b");
        assert_eq!(worst[0].0, "a");
    }
}
