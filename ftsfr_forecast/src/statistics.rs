//! Per-dataset descriptive statistics, before and after preprocessing
//!
//! Datasets whose parquet cannot be read are reported as `N/A` instead of
//! aborting the pass.

use crate::data::{DataLoader, Panel};
use crate::error::{ForecastError, Result};
use crate::latex::{escape, number, LatexTable};
use crate::preprocess::Preprocessor;
use crate::registry::{DatasetCatalog, DatasetGroup, DatasetSpec};
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::{Data, Median};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const NA: &str = "N/A";

/// Entity count, length spread and date range of a set of series
#[derive(Debug, Clone, PartialEq)]
pub struct PanelStatistics {
    pub n_series: usize,
    pub min_length: usize,
    pub median_length: f64,
    pub max_length: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PanelStatistics {
    pub fn from_lengths(lengths: &[usize], range: Option<(NaiveDate, NaiveDate)>) -> Option<Self> {
        let (start, end) = range?;
        let min_length = *lengths.iter().min()?;
        let max_length = *lengths.iter().max()?;
        let median_length = Data::new(lengths.iter().map(|l| *l as f64).collect::<Vec<_>>()).median();
        Some(Self {
            n_series: lengths.len(),
            min_length,
            median_length,
            max_length,
            start,
            end,
        })
    }

    pub fn from_panel(panel: &Panel) -> Option<Self> {
        Self::from_lengths(&panel.lengths(), panel.date_range())
    }
}

/// Post-filter view of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredStatistics {
    /// `None` when no series survived
    pub stats: Option<PanelStatistics>,
    pub removed: usize,
    pub retention_pct: f64,
    pub min_required_obs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStatistics {
    pub dataset: String,
    pub display_name: String,
    pub group: DatasetGroup,
    pub frequency: String,
    pub raw: Option<PanelStatistics>,
    pub filtered: Option<FilteredStatistics>,
}

/// Both views of one dataset; never fails
pub fn dataset_statistics(spec: &DatasetSpec) -> DatasetStatistics {
    let mut stats = DatasetStatistics {
        dataset: spec.name.clone(),
        display_name: spec.display_name.clone(),
        group: spec.group,
        frequency: spec.frequency.code().to_string(),
        raw: None,
        filtered: None,
    };
    let panel = match DataLoader::load(spec) {
        Ok(panel) => panel,
        Err(e) => {
            warn!(dataset = %spec.name, error = %e, "dataset unavailable, reported as N/A");
            return stats;
        }
    };
    stats.raw = PanelStatistics::from_panel(&panel);
    stats.filtered = Some(filtered_statistics(spec, &panel));
    stats
}

fn filtered_statistics(spec: &DatasetSpec, panel: &Panel) -> FilteredStatistics {
    let preprocessor = Preprocessor::new(spec.frequency, spec.seasonality);
    let min_required_obs = preprocessor.requirements().min_total_obs;
    let retention = |kept: usize| {
        if panel.is_empty() {
            0.0
        } else {
            100.0 * kept as f64 / panel.len() as f64
        }
    };
    match preprocessor.run(panel) {
        Ok(prepared) => FilteredStatistics {
            stats: PanelStatistics::from_lengths(&prepared.lengths(), prepared.date_range()),
            removed: prepared.report.removed(),
            retention_pct: retention(prepared.len()),
            min_required_obs,
        },
        Err(e) => {
            if !matches!(e, ForecastError::NoValidSeries { .. }) {
                warn!(dataset = %spec.name, error = %e, "preprocessing failed");
            }
            FilteredStatistics {
                stats: None,
                removed: panel.len(),
                retention_pct: retention(0),
                min_required_obs,
            }
        }
    }
}

/// Statistics of every catalog dataset, ordered by group then name
pub fn collect(catalog: &DatasetCatalog) -> Vec<DatasetStatistics> {
    let mut all: Vec<DatasetStatistics> = catalog.datasets().iter().map(dataset_statistics).collect();
    sort_for_report(&mut all);
    all
}

pub fn sort_for_report(stats: &mut [DatasetStatistics]) {
    stats.sort_by(|a, b| {
        (a.group, a.display_name.to_lowercase()).cmp(&(b.group, b.display_name.to_lowercase()))
    });
}

#[derive(Debug, Serialize)]
struct RawRecord {
    group: String,
    dataset: String,
    display_name: String,
    frequency: String,
    entities: String,
    min_length: String,
    median_length: String,
    max_length: String,
    start_date: String,
    end_date: String,
}

/// Raw columns plus the filter outcome; spelled out since csv cannot
/// serialize flattened structs
#[derive(Debug, Serialize)]
struct FilteredRecord {
    group: String,
    dataset: String,
    display_name: String,
    frequency: String,
    entities: String,
    min_length: String,
    median_length: String,
    max_length: String,
    start_date: String,
    end_date: String,
    entities_removed: String,
    retention_pct: String,
    min_required_obs: String,
}

fn raw_record(s: &DatasetStatistics, view: Option<&PanelStatistics>) -> RawRecord {
    let cell = |f: &dyn Fn(&PanelStatistics) -> String| view.map(f).unwrap_or_else(|| NA.to_string());
    RawRecord {
        group: s.group.title().to_string(),
        dataset: s.dataset.clone(),
        display_name: s.display_name.clone(),
        frequency: s.frequency.clone(),
        entities: cell(&|v| v.n_series.to_string()),
        min_length: cell(&|v| v.min_length.to_string()),
        median_length: cell(&|v| format!("{:.1}", v.median_length)),
        max_length: cell(&|v| v.max_length.to_string()),
        start_date: cell(&|v| v.start.to_string()),
        end_date: cell(&|v| v.end.to_string()),
    }
}

fn filtered_record(s: &DatasetStatistics) -> FilteredRecord {
    let filtered = s.filtered.as_ref();
    let view = filtered.and_then(|f| f.stats.as_ref());
    let base = raw_record(s, view);
    FilteredRecord {
        group: base.group,
        dataset: base.dataset,
        display_name: base.display_name,
        frequency: base.frequency,
        entities: base.entities,
        min_length: base.min_length,
        median_length: base.median_length,
        max_length: base.max_length,
        start_date: base.start_date,
        end_date: base.end_date,
        entities_removed: filtered.map_or(NA.to_string(), |f| f.removed.to_string()),
        retention_pct: filtered.map_or(NA.to_string(), |f| format!("{:.1}", f.retention_pct)),
        min_required_obs: filtered.map_or(NA.to_string(), |f| f.min_required_obs.to_string()),
    }
}

fn grouped_rows(
    stats: &[DatasetStatistics],
    row: impl Fn(&DatasetStatistics) -> Vec<String>,
) -> Vec<(DatasetGroup, Vec<Vec<String>>)> {
    let mut groups: Vec<(DatasetGroup, Vec<Vec<String>>)> = Vec::new();
    for s in stats {
        match groups.last_mut() {
            Some((group, rows)) if *group == s.group => rows.push(row(s)),
            _ => groups.push((s.group, vec![row(s)])),
        }
    }
    groups
}

fn latex_counts(view: Option<&PanelStatistics>) -> Vec<String> {
    vec![
        view.map_or(NA.to_string(), |v| v.n_series.to_string()),
        number(view.map(|v| v.median_length), 0),
        view.map_or(NA.to_string(), |v| format!("{} -- {}", v.start, v.end)),
    ]
}

fn raw_latex(stats: &[DatasetStatistics]) -> String {
    let mut table = LatexTable::new(
        "Dataset statistics before filtering",
        "tab:dataset_statistics",
        "llrrl",
        &["Dataset", "Freq.", "Entities", "Median length", "Date range"],
    );
    for (group, rows) in grouped_rows(stats, |s| {
        let mut row = vec![escape(&s.display_name), s.frequency.clone()];
        row.extend(latex_counts(s.raw.as_ref()));
        row
    }) {
        table.section(Some(group.title()), rows);
    }
    table.render()
}

fn filtered_latex(stats: &[DatasetStatistics]) -> String {
    let mut table = LatexTable::new(
        "Dataset statistics after filtering",
        "tab:filtered_dataset_statistics",
        "llrrlrrr",
        &[
            "Dataset",
            "Freq.",
            "Entities",
            "Median length",
            "Date range",
            "Removed",
            "Retained (%)",
            "Min. obs.",
        ],
    );
    for (group, rows) in grouped_rows(stats, |s| {
        let filtered = s.filtered.as_ref();
        let mut row = vec![escape(&s.display_name), s.frequency.clone()];
        row.extend(latex_counts(filtered.and_then(|f| f.stats.as_ref())));
        row.push(filtered.map_or(NA.to_string(), |f| f.removed.to_string()));
        row.push(number(filtered.map(|f| f.retention_pct), 1));
        row.push(filtered.map_or(NA.to_string(), |f| f.min_required_obs.to_string()));
        row
    }) {
        table.section(Some(group.title()), rows);
    }
    table.render()
}

/// Write `dataset_statistics.{csv,tex}` and
/// `filtered_dataset_statistics.{csv,tex}` into `paper_dir`
pub fn write_reports(stats: &[DatasetStatistics], paper_dir: &Path) -> Result<()> {
    fs::create_dir_all(paper_dir)?;

    let mut raw = csv::Writer::from_path(paper_dir.join("dataset_statistics.csv"))?;
    for s in stats {
        raw.serialize(raw_record(s, s.raw.as_ref()))?;
    }
    raw.flush()?;

    let mut filtered = csv::Writer::from_path(paper_dir.join("filtered_dataset_statistics.csv"))?;
    for s in stats {
        filtered.serialize(filtered_record(s))?;
    }
    filtered.flush()?;

    fs::write(paper_dir.join("dataset_statistics.tex"), raw_latex(stats))?;
    fs::write(
        paper_dir.join("filtered_dataset_statistics.tex"),
        filtered_latex(stats),
    )?;
    info!(
        datasets = stats.len(),
        unavailable = stats.iter().filter(|s| s.raw.is_none()).count(),
        dir = %paper_dir.display(),
        "dataset statistics written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn unavailable(name: &str, group: DatasetGroup) -> DatasetStatistics {
        DatasetStatistics {
            dataset: name.to_string(),
            display_name: name.to_string(),
            group,
            frequency: "ME".to_string(),
            raw: None,
            filtered: None,
        }
    }

    #[test]
    fn median_of_even_count() {
        let stats = PanelStatistics::from_lengths(
            &[10, 20, 30, 40],
            Some((date(2000, 1, 31), date(2010, 1, 31))),
        )
        .unwrap();
        assert_eq!(stats.n_series, 4);
        assert_eq!(stats.median_length, 25.0);
        assert_eq!((stats.min_length, stats.max_length), (10, 40));
        assert!(PanelStatistics::from_lengths(&[], None).is_none());
    }

    #[test]
    fn report_orders_by_group_then_name() {
        let mut stats = vec![
            unavailable("zeta", DatasetGroup::BasisSpreads),
            unavailable("beta", DatasetGroup::Other),
            unavailable("Alpha", DatasetGroup::BasisSpreads),
        ];
        sort_for_report(&mut stats);
        let names: Vec<&str> = stats.iter().map(|s| s.dataset.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "beta"]);
    }

    #[test]
    fn unavailable_dataset_is_na() {
        let tmp = tempfile::tempdir().unwrap();
        let stats = vec![unavailable("ftsfr_missing", DatasetGroup::Other)];
        write_reports(&stats, tmp.path()).unwrap();
        let csv = fs::read_to_string(tmp.path().join("filtered_dataset_statistics.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("group,dataset,display_name,frequency,entities"));
        assert!(lines[0].ends_with("entities_removed,retention_pct,min_required_obs"));
        assert!(lines[1].contains("N/A"));
        assert!(tmp.path().join("dataset_statistics.tex").is_file());
    }
}
