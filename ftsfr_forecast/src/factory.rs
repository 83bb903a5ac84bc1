//! Model construction from catalog entries
//!
//! Catalog constructors name the backend implementation. Parameters are
//! resolved against the dataset first, so `"{season_length}"` becomes the
//! dataset's seasonality and `"{horizon}"` its forecast horizon.

use crate::config::Settings;
use crate::error::{ForecastError, Result};
use crate::registry::{DatasetSpec, ModelFamily, ModelSpec, ParamContext};
use ftsfr_models::models::{
    AutoArima, AutoCes, AutoEts, CrostonClassic, DynamicOptimizedTheta, ForecastModel,
    HistoricAverage, HoltWinters, SeasonalNaive, SimpleExponentialSmoothing, Theta,
};
use ftsfr_neural::{AutoConfig, AutoNeural, NeuralFamily, ScalerType, SearchSpace};
use toml::{Table, Value};
use tracing::debug;

/// Trials per neural search when neither settings nor catalog set one
pub const DEFAULT_NUM_SAMPLES: usize = 10;

/// A ready-to-run model
#[derive(Debug)]
pub enum ModelInstance {
    Statistical(Box<dyn ForecastModel>),
    Neural(AutoNeural),
}

impl ModelInstance {
    /// Name of the forecast column the model produces
    pub fn column_name(&self) -> &str {
        match self {
            ModelInstance::Statistical(model) => model.name(),
            ModelInstance::Neural(auto) => auto.family().column_name(),
        }
    }
}

/// Build the model of `spec` for one dataset
pub fn build_model(
    spec: &ModelSpec,
    dataset: &DatasetSpec,
    horizon: usize,
    settings: &Settings,
) -> Result<ModelInstance> {
    let ctx = ParamContext {
        season_length: dataset.seasonality,
        horizon,
        frequency: dataset.frequency,
    };
    let params = spec.resolve_params(&ctx);
    debug!(model = %spec.name, constructor = %spec.constructor, ?params, "building model");

    match spec.family {
        ModelFamily::Statistical => {
            let season_length = usize_param(spec, &params, "season_length")?.unwrap_or(dataset.seasonality);
            statistical_model(spec, season_length).map(ModelInstance::Statistical)
        }
        ModelFamily::NeuralAuto => neural_model(spec, dataset, horizon, &params, settings).map(ModelInstance::Neural),
    }
}

/// Statistical constructor by name
pub fn statistical_model(spec: &ModelSpec, season_length: usize) -> Result<Box<dyn ForecastModel>> {
    let model: Box<dyn ForecastModel> = match spec.constructor.as_str() {
        "HistoricAverage" => Box::new(HistoricAverage::new()),
        "SeasonalNaive" => Box::new(SeasonalNaive::new(season_length).map_err(|e| invalid(spec, e))?),
        "AutoARIMA" => Box::new(AutoArima::new(season_length)),
        "AutoCES" => Box::new(AutoCes::new(season_length)),
        "AutoETS" => Box::new(AutoEts::new(season_length)),
        "CrostonClassic" => Box::new(CrostonClassic::new()),
        "DynamicOptimizedTheta" => Box::new(DynamicOptimizedTheta::new(season_length)),
        "HoltWinters" => Box::new(HoltWinters::new(season_length)),
        "SimpleExponentialSmoothingOptimized" => Box::new(SimpleExponentialSmoothing::new()),
        "Theta" => Box::new(Theta::new(season_length)),
        other => {
            return Err(ForecastError::ConfigError(format!(
                "models.{}: unknown statistical constructor '{}'",
                spec.name, other
            )))
        }
    };
    Ok(model)
}

fn neural_model(
    spec: &ModelSpec,
    dataset: &DatasetSpec,
    horizon: usize,
    params: &Table,
    settings: &Settings,
) -> Result<AutoNeural> {
    let family = NeuralFamily::ALL
        .iter()
        .copied()
        .find(|f| f.column_name() == spec.constructor)
        .ok_or_else(|| {
            ForecastError::ConfigError(format!(
                "models.{}: unknown neural constructor '{}'",
                spec.name, spec.constructor
            ))
        })?;

    let num_samples = match settings.num_samples {
        Some(n) => n,
        None => usize_param(spec, params, "num_samples")?.unwrap_or(DEFAULT_NUM_SAMPLES),
    };
    let config = AutoConfig {
        num_samples: num_samples.max(1),
        search_seed: settings.search_seed,
        n_epochs: settings.n_epochs,
        log_dir: Some(settings.logs_dir(&dataset.name, &spec.name)),
        ..AutoConfig::default()
    };

    let mut space = SearchSpace::for_family(family);
    if let Some(value) = params.get("scaler_type") {
        let scaler: ScalerType = value.clone().try_into().map_err(|e| {
            ForecastError::ConfigError(format!("models.{}.params.scaler_type: {}", spec.name, e))
        })?;
        space.scaler_type = vec![scaler];
    }
    Ok(AutoNeural::new(family, horizon, config).with_search_space(space))
}

fn usize_param(spec: &ModelSpec, params: &Table, key: &str) -> Result<Option<usize>> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Integer(v)) if *v >= 1 => Ok(Some(*v as usize)),
        Some(other) => Err(ForecastError::ConfigError(format!(
            "models.{}.params.{} must be a positive integer, got {}",
            spec.name, key, other
        ))),
    }
}

fn invalid(spec: &ModelSpec, err: impl std::fmt::Display) -> ForecastError {
    ForecastError::ConfigError(format!("models.{}: {}", spec.name, err))
}

/// Accelerator hints for neural runs, set before any training starts
pub fn configure_accelerator_env() {
    std::env::set_var("PYTORCH_ENABLE_MPS_FALLBACK", "1");
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        std::env::set_var("PYTORCH_MPS_HIGH_WATERMARK_RATIO", "0.0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::Frequency;
    use crate::registry::{DatasetGroup, ModelCatalog};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const MODELS: &str = r#"
[models.theta]
library = "statistical"
family = "statistical"
constructor = "Theta"
params = { season_length = "{season_length}" }

[models.seasonal_naive]
library = "statistical"
family = "statistical"
constructor = "SeasonalNaive"
params = { season_length = "{season_length}" }

[models.auto_nhits]
library = "neural"
family = "neural-auto"
constructor = "AutoNHITS"
params = { h = "{horizon}", num_samples = 3, scaler_type = "standard" }

[models.mystery]
library = "statistical"
family = "statistical"
constructor = "Prophet"
"#;

    fn dataset() -> DatasetSpec {
        DatasetSpec {
            name: "ftsfr_demo".to_string(),
            module: "demo".to_string(),
            path: PathBuf::from("_data/formatted/demo/ftsfr_demo.parquet"),
            frequency: Frequency::QuarterEnd,
            seasonality: 4,
            group: DatasetGroup::Other,
            table_name: "Demo".to_string(),
            display_name: "Demo".to_string(),
        }
    }

    #[test]
    fn builds_statistical_models_by_constructor() {
        let catalog = ModelCatalog::parse(MODELS).unwrap();
        let settings = Settings::default();
        let theta = build_model(catalog.resolve("theta").unwrap(), &dataset(), 12, &settings).unwrap();
        assert_eq!(theta.column_name(), "Theta");
        let naive =
            build_model(catalog.resolve("seasonal_naive").unwrap(), &dataset(), 12, &settings).unwrap();
        assert_eq!(naive.column_name(), "SeasonalNaive");
    }

    #[test]
    fn neural_search_honours_settings_override() {
        let catalog = ModelCatalog::parse(MODELS).unwrap();
        let settings = Settings {
            num_samples: Some(1),
            ..Settings::default()
        };
        let model = build_model(catalog.resolve("auto_nhits").unwrap(), &dataset(), 12, &settings).unwrap();
        match model {
            ModelInstance::Neural(auto) => {
                assert_eq!(auto.family(), NeuralFamily::Nhits);
                assert_eq!(auto.horizon(), 12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_constructor_is_config_error() {
        let catalog = ModelCatalog::parse(MODELS).unwrap();
        let err = build_model(
            catalog.resolve("mystery").unwrap(),
            &dataset(),
            12,
            &Settings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::ConfigError(_)));
        assert!(err.to_string().contains("Prophet"));
    }
}
