mod common;

use common::{date, dates, harness, series, write_dataset};
use ftsfr_forecast::metrics::align_train;
use ftsfr_forecast::preprocess::{canonical_grid, normalize_series};
use ftsfr_forecast::{ForecastError, Frequency, Panel, Preprocessor};
use ftsfr_models::models::{ForecastModel, HistoricAverage};
use ftsfr_models::{CrossValidation, SeriesFrame};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[test]
fn all_null_dataset_has_no_valid_series() {
    let tmp = tempdir().unwrap();
    let ds = dates(Frequency::MonthEnd, date(2000, 1, 31), 120);
    let panel = Panel::new(
        "ftsfr_empty",
        vec![
            SeriesFrame::new("a", ds.clone(), vec![None; 120]),
            SeriesFrame::new("b", ds, vec![None; 120]),
        ],
    );
    write_dataset(tmp.path(), "ftsfr_empty", &panel);
    let harness = harness(tmp.path(), &common::dataset_catalog(&[("ftsfr_empty", "ME", 12)]));

    let err = harness.forecast("ftsfr_empty", "historic_average").unwrap_err();
    assert!(matches!(err, ForecastError::NoValidSeries { .. }), "{:?}", err);
    assert!(!harness
        .settings
        .result_path("ftsfr_empty", "historic_average")
        .exists());
}

#[test]
fn short_panel_reports_effective_requirements() {
    let tmp = tempdir().unwrap();
    let panel = Panel::new(
        "ftsfr_short",
        (0..10)
            .map(|k| series(&format!("s{}", k), Frequency::MonthEnd, date(2020, 1, 31), 8, k as f64))
            .collect(),
    );
    write_dataset(tmp.path(), "ftsfr_short", &panel);
    let harness = harness(tmp.path(), &common::dataset_catalog(&[("ftsfr_short", "ME", 12)]));

    let err = harness.forecast("ftsfr_short", "theta").unwrap_err();
    let message = err.to_string();
    assert!(!message.contains('\n'));
    assert!(message.contains("frequency ME"), "{}", message);
    assert!(message.contains("min_total_obs=63"), "{}", message);
    match err {
        ForecastError::NoValidSeries { report, .. } => {
            assert_eq!(report.input_series, 10);
            assert_eq!(report.too_short, 10);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!harness.settings.error_metrics_dir().join("ftsfr_short").exists());
}

#[test]
fn month_end_normalisation_is_idempotent_and_grid_is_monotone() {
    let raw = SeriesFrame::new(
        "a",
        vec![date(2020, 1, 15), date(2020, 1, 31), date(2020, 3, 2), date(2020, 6, 30)],
        vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
    );
    let once = normalize_series(&raw, Frequency::MonthEnd);
    let twice = normalize_series(&once, Frequency::MonthEnd);
    assert_eq!(once, twice);
    // duplicate January collapses to the last value
    assert_eq!(once.ds[0], date(2020, 1, 31));
    assert_eq!(once.y[0], Some(2.0));

    let grid = canonical_grid(&once, Frequency::MonthEnd);
    assert_eq!(grid.len(), 6);
    assert!(grid.ds.windows(2).all(|w| w[0] < w[1]));
    assert!(grid.ds.iter().all(|d| Frequency::MonthEnd.is_on_grid(*d)));
    assert_eq!(grid.y[1], None);
}

#[test]
fn split_is_positional_and_test_is_never_imputed() {
    let mut frame = series("a", Frequency::MonthEnd, date(2000, 1, 31), 120, 0.0);
    frame.y[10] = None;
    frame.y[100] = None;
    let panel = Panel::new("demo", vec![frame.clone()]);

    let prepared = Preprocessor::new(Frequency::MonthEnd, 12).run(&panel).unwrap();
    let prepared_series = &prepared.series[0];
    assert_eq!(prepared_series.train.len(), 84);
    assert_eq!(prepared_series.test.len(), 36);
    assert_eq!(prepared_series.test.ds[0], frame.ds[84]);
    // no full season before slot 10, so the gap is forward filled
    assert_eq!(prepared_series.train.y[10], frame.y[9]);
    assert!(prepared_series.train.y.iter().all(Option::is_some));
    // the test gap stays null
    assert_eq!(prepared_series.test.y[100 - 84], None);
    assert!(prepared_series.is_gap[100]);
}

#[test]
fn quarterly_cutoffs_follow_each_series() {
    let a = series("a", Frequency::QuarterEnd, date(2005, 3, 31), 60, 0.0);
    let b = series("b", Frequency::QuarterEnd, date(2000, 3, 31), 48, 5.0);
    let panel = Panel::new("quarterly", vec![a.clone(), b.clone()]);
    let prepared = Preprocessor::new(Frequency::QuarterEnd, 4).run(&panel).unwrap();
    assert_eq!(prepared.horizon, 12);

    let models: Vec<Box<dyn ForecastModel>> = vec![Box::new(HistoricAverage::new())];
    let table = CrossValidation::single_window(12)
        .unwrap()
        .run(&prepared.full_frames(), &models, None)
        .unwrap();
    let cutoffs = table.cutoffs();
    assert_eq!(cutoffs["a"], a.ds[60 - 13]);
    assert_eq!(cutoffs["b"], b.ds[48 - 13]);

    let aligned = align_train(&prepared.train_frames(), &cutoffs);
    let by_id = |id: &str| aligned.iter().find(|f| f.unique_id == id).unwrap().clone();
    assert_eq!(by_id("a").len(), 48);
    assert_eq!(by_id("a").last_ds(), Some(cutoffs["a"]));
    assert_eq!(by_id("b").len(), 36);
    assert_eq!(by_id("b").last_ds(), Some(cutoffs["b"]));
}
