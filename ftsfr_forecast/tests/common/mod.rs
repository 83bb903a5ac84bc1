//! Shared fixtures: synthetic panels written as parquet under a scratch tree

#![allow(dead_code)]

use chrono::NaiveDate;
use ftsfr_forecast::data::write_parquet;
use ftsfr_forecast::{DatasetCatalog, Frequency, Harness, ModelCatalog, Panel, Settings};
use ftsfr_models::SeriesFrame;
use std::path::Path;

pub const MODELS: &str = include_str!("../../../config/models.toml");

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive grid dates starting at `start`
pub fn dates(frequency: Frequency, start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut current = frequency.anchor(start);
    for _ in 0..n {
        out.push(current);
        current = frequency.next(current);
    }
    out
}

/// Seasonal wave with a slow trend, distinct per `offset`
pub fn wave(n: usize, period: usize, offset: f64) -> Vec<Option<f64>> {
    (0..n)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / period as f64;
            Some(10.0 + offset + 0.05 * i as f64 + 3.0 * phase.sin() + 0.7 * ((i * 7) % 5) as f64)
        })
        .collect()
}

pub fn series(id: &str, frequency: Frequency, start: NaiveDate, n: usize, offset: f64) -> SeriesFrame {
    let period = match frequency {
        Frequency::QuarterEnd | Frequency::QuarterStart => 4,
        _ => 12,
    };
    SeriesFrame::new(id, dates(frequency, start, n), wave(n, period, offset))
}

/// Catalog with one module holding the given (dataset, frequency, seasonality)
pub fn dataset_catalog(entries: &[(&str, &str, usize)]) -> String {
    let mut text = String::from("[testing]\ndescription = \"fixtures\"\n");
    for (name, frequency, seasonality) in entries {
        text.push_str(&format!(
            "\n[testing.{}]\nfrequency = \"{}\"\nseasonality = {}\ngroup = \"other\"\ntable_name = \"{}\"\n",
            name, frequency, seasonality, name
        ));
    }
    text
}

/// Write `panel` where the catalog expects dataset `name`
pub fn write_dataset(root: &Path, name: &str, panel: &Panel) {
    let path = root
        .join("data")
        .join("formatted")
        .join("testing")
        .join(format!("{}.parquet", name));
    write_parquet(panel, path).unwrap();
}

/// Harness rooted in `root`, with the real model catalog
pub fn harness(root: &Path, datasets: &str) -> Harness {
    let settings = Settings {
        data_dir: root.join("data"),
        output_dir: root.join("output"),
        num_samples: Some(1),
        n_epochs: Some(1),
        ..Settings::default()
    };
    let datasets = DatasetCatalog::parse(datasets, &settings.data_dir).unwrap();
    let models = ModelCatalog::parse(MODELS).unwrap();
    Harness::new(settings, datasets, models)
}
