//! One-row result files and the skip guard

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Header of every result file
pub const RESULT_COLUMNS: [&str; 7] = [
    "model_name",
    "dataset_name",
    "MASE",
    "MSE",
    "RMSE",
    "R2oos",
    "time_taken",
];

/// Columns the skip guard requires
const REQUIRED_COLUMNS: [&str; 6] = ["model_name", "dataset_name", "MASE", "MSE", "RMSE", "R2oos"];

/// Metrics of one (dataset, model) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub model_name: String,
    pub dataset_name: String,
    #[serde(rename = "MASE")]
    pub mase: f64,
    #[serde(rename = "MSE")]
    pub mse: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "R2oos")]
    pub r2oos: f64,
    /// Seconds
    #[serde(default)]
    pub time_taken: f64,
}

impl MetricRow {
    /// All four metrics finite, with non-zero MSE and RMSE. R2oos may be
    /// zero or negative.
    pub fn is_valid(&self) -> bool {
        [self.mase, self.mse, self.rmse, self.r2oos]
            .iter()
            .all(|v| v.is_finite())
            && self.mse != 0.0
            && self.rmse != 0.0
    }
}

/// Write `row` as a one-row CSV, replacing any previous file atomically
pub fn write_result(path: &Path, row: &MetricRow) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.serialize(row)?;
        writer.flush()?;
    }
    tmp.as_file_mut().flush()?;
    tmp.persist(path)
        .map_err(|e| ForecastError::IoError(e.error))?;
    Ok(())
}

/// Read the first row of a result file
pub fn read_result(path: &Path) -> Result<Option<MetricRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    match reader.deserialize().next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Outcome of the skip guard
#[derive(Debug, Clone, PartialEq)]
pub enum SkipCheck {
    /// A valid prior result exists
    Skip(MetricRow),
    /// Run, with the reason the existing file (if any) was not reused
    Proceed(String),
}

impl SkipCheck {
    pub fn should_skip(&self) -> bool {
        matches!(self, SkipCheck::Skip(_))
    }
}

/// Decide whether a prior result at `path` can be reused
pub fn check_existing(path: &Path) -> SkipCheck {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return SkipCheck::Proceed("no prior result".to_string()),
    };
    if metadata.len() == 0 {
        return SkipCheck::Proceed("prior result is empty".to_string());
    }

    let mut reader = match csv::Reader::from_path(path) {
        Ok(r) => r,
        Err(e) => return SkipCheck::Proceed(format!("prior result unreadable: {}", e)),
    };
    match reader.headers() {
        Ok(headers) => {
            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .filter(|c| !headers.iter().any(|h| h == *c))
                .collect();
            if !missing.is_empty() {
                return SkipCheck::Proceed(format!(
                    "prior result lacks columns {}",
                    missing.join(", ")
                ));
            }
        }
        Err(e) => return SkipCheck::Proceed(format!("prior result unreadable: {}", e)),
    }

    match reader.deserialize::<MetricRow>().next() {
        Some(Ok(row)) if row.is_valid() => SkipCheck::Skip(row),
        Some(Ok(_)) => SkipCheck::Proceed("prior result has invalid metrics".to_string()),
        Some(Err(e)) => SkipCheck::Proceed(format!("prior result unparsable: {}", e)),
        None => SkipCheck::Proceed("prior result has no rows".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn row() -> MetricRow {
        MetricRow {
            model_name: "theta".to_string(),
            dataset_name: "ftsfr_demo".to_string(),
            mase: 1.25,
            mse: 0.5,
            rmse: 0.5f64.sqrt(),
            r2oos: -0.1,
            time_taken: 2.0,
        }
    }

    #[test]
    fn written_file_has_header_and_one_row() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("error_metrics/ftsfr_demo/theta.csv");
        write_result(&path, &row()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], RESULT_COLUMNS.join(","));
        assert_eq!(read_result(&path).unwrap(), Some(row()));
        // no temporary files left behind
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn guard_skips_valid_result() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("theta.csv");
        write_result(&path, &row()).unwrap();
        assert_eq!(check_existing(&path), SkipCheck::Skip(row()));
    }

    #[test]
    fn guard_proceeds_without_file() {
        let tmp = tempdir().unwrap();
        assert!(!check_existing(&tmp.path().join("missing.csv")).should_skip());
    }

    #[test]
    fn guard_rejects_zero_mse() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("theta.csv");
        write_result(
            &path,
            &MetricRow {
                mse: 0.0,
                rmse: 0.0,
                ..row()
            },
        )
        .unwrap();
        assert!(!check_existing(&path).should_skip());
    }

    #[test]
    fn guard_accepts_negative_r2() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("theta.csv");
        write_result(
            &path,
            &MetricRow {
                r2oos: -3.0,
                ..row()
            },
        )
        .unwrap();
        assert!(check_existing(&path).should_skip());
    }

    #[test]
    fn guard_rejects_missing_columns_and_text() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("theta.csv");
        fs::write(&path, "model_name,dataset_name,MASE\ntheta,ftsfr_demo,1.0\n").unwrap();
        assert!(!check_existing(&path).should_skip());

        fs::write(
            &path,
            "model_name,dataset_name,MASE,MSE,RMSE,R2oos,time_taken\ntheta,ftsfr_demo,Error,1,1,0,1\n",
        )
        .unwrap();
        assert!(!check_existing(&path).should_skip());

        fs::write(&path, "").unwrap();
        assert!(!check_existing(&path).should_skip());
    }
}
