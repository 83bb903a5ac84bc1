use ftsfr_forecast::factory::{build_model, ModelInstance};
use ftsfr_forecast::registry::{DatasetGroup, ModelFamily, NEURAL_MODELS, STATISTICAL_MODELS};
use ftsfr_forecast::{DatasetCatalog, ForecastError, Frequency, ModelCatalog, Settings};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};

fn config(file: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config").join(file)
}

#[test]
fn shipped_dataset_catalog_resolves_benchmark_datasets() {
    let catalog = DatasetCatalog::load(config("datasets.toml"), "_data").unwrap();
    assert!(catalog.len() >= 20);

    let tips = catalog.resolve("ftsfr_tips_treasury_basis").unwrap();
    assert_eq!(tips.frequency, Frequency::MonthEnd);
    assert_eq!(tips.seasonality, 12);
    assert_eq!(tips.group, DatasetGroup::BasisSpreads);
    assert_eq!(
        tips.path,
        PathBuf::from("_data/formatted/basis_tips_treas/ftsfr_tips_treasury_basis.parquet")
    );

    for name in [
        "ftsfr_he_kelly_manela_factors_monthly",
        "ftsfr_CRSP_monthly_stock_ret",
    ] {
        assert!(catalog.resolve(name).is_ok(), "{} missing", name);
    }
}

#[test]
fn unknown_dataset_lists_known_names() {
    let catalog = DatasetCatalog::load(config("datasets.toml"), "_data").unwrap();
    let err = catalog.resolve("ftsfr_nope").unwrap_err();
    assert!(matches!(err, ForecastError::DatasetNotFound { .. }));
    assert!(err.to_string().contains("ftsfr_tips_treasury_basis"));
}

#[test]
fn every_cli_model_builds_from_shipped_catalog() {
    let datasets = DatasetCatalog::load(config("datasets.toml"), "_data").unwrap();
    let models = ModelCatalog::load(config("models.toml")).unwrap();
    let dataset = datasets.resolve("ftsfr_treas_sf_basis").unwrap();
    let settings = Settings::default();

    for name in STATISTICAL_MODELS {
        let spec = models.resolve(name).unwrap();
        assert_eq!(spec.family, ModelFamily::Statistical);
        let model = build_model(spec, dataset, 36, &settings).unwrap();
        assert!(matches!(model, ModelInstance::Statistical(_)), "{}", name);
    }
    for name in NEURAL_MODELS {
        let spec = models.resolve(name).unwrap();
        assert_eq!(spec.family, ModelFamily::NeuralAuto);
        match build_model(spec, dataset, 36, &settings).unwrap() {
            ModelInstance::Neural(auto) => assert_eq!(auto.family().model_name(), name),
            other => panic!("{} built {:?}", name, other),
        }
    }
    assert_eq!(models.models().len(), STATISTICAL_MODELS.len() + NEURAL_MODELS.len());
}
