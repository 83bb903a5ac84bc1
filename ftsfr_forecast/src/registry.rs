//! Dataset and model catalogs
//!
//! The dataset catalog groups datasets by module:
//!
//! ```toml
//! [basis_treas_sf]
//! description = "Treasury spot-futures basis"   # module metadata
//!
//! [basis_treas_sf.ftsfr_treas_sf_basis]
//! frequency = "ME"
//! seasonality = 12
//! group = "basis_spreads"
//! table_name = "Treasury SF Basis"
//! ```
//!
//! The model catalog maps names to constructors with placeholder parameters:
//!
//! ```toml
//! [models.auto_arima]
//! library = "statistical"
//! family = "statistical"
//! constructor = "AutoARIMA"
//! params = { season_length = "{season_length}" }
//! ```

use crate::error::{ForecastError, Result};
use crate::frequency::Frequency;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// Dataset keys start with this prefix; other keys of a module are metadata
pub const DATASET_PREFIX: &str = "ftsfr_";

pub const DEFAULT_FREQUENCY: Frequency = Frequency::MonthEnd;
pub const DEFAULT_SEASONALITY: usize = 12;

/// Models accepted by `forecast_stats`
pub const STATISTICAL_MODELS: [&str; 10] = [
    "historic_average",
    "seasonal_naive",
    "auto_arima",
    "auto_ces",
    "auto_ets",
    "croston",
    "dot",
    "holt_winters",
    "ses",
    "theta",
];

/// Models accepted by `forecast_neural`
pub const NEURAL_MODELS: [&str; 9] = [
    "auto_deepar",
    "auto_nbeats",
    "auto_nhits",
    "auto_dlinear",
    "auto_nlinear",
    "auto_vanilla_transformer",
    "auto_tide",
    "auto_kan",
    "auto_lstm",
];

/// Domain group used to order the statistics tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetGroup {
    BasisSpreads,
    ReturnsPortfolios,
    ReturnsDisaggregated,
    Other,
}

impl DatasetGroup {
    pub fn title(&self) -> &'static str {
        match self {
            DatasetGroup::BasisSpreads => "Basis Spreads",
            DatasetGroup::ReturnsPortfolios => "Returns (Portfolios)",
            DatasetGroup::ReturnsDisaggregated => "Returns (Disaggregated)",
            DatasetGroup::Other => "Other",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "basis_spreads" => DatasetGroup::BasisSpreads,
            "returns_portfolios" => DatasetGroup::ReturnsPortfolios,
            "returns_disaggregated" => DatasetGroup::ReturnsDisaggregated,
            _ => DatasetGroup::Other,
        }
    }
}

impl fmt::Display for DatasetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A fully resolved catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub name: String,
    pub module: String,
    pub path: PathBuf,
    pub frequency: Frequency,
    pub seasonality: usize,
    pub group: DatasetGroup,
    pub table_name: String,
    pub display_name: String,
}

/// Every dataset of the catalog, in file order
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    datasets: Vec<DatasetSpec>,
}

impl DatasetCatalog {
    /// Read a catalog file; parquet paths are rooted at `data_dir`
    pub fn load(path: impl AsRef<Path>, data_dir: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ForecastError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text, data_dir)
    }

    pub fn parse(text: &str, data_dir: impl AsRef<Path>) -> Result<Self> {
        let root: Table = text.parse()?;
        let formatted = data_dir.as_ref().join("formatted");
        let mut datasets = Vec::new();
        for (module, entries) in &root {
            let Some(entries) = entries.as_table() else {
                continue;
            };
            for (name, entry) in entries {
                if !name.starts_with(DATASET_PREFIX) {
                    continue;
                }
                let entry = entry.as_table().ok_or_else(|| {
                    ForecastError::ConfigError(format!("{}.{} must be a table", module, name))
                })?;
                datasets.push(dataset_spec(&formatted, module, name, entry)?);
            }
        }
        Ok(Self { datasets })
    }

    /// First dataset with this name, scanning modules in file order
    pub fn resolve(&self, name: &str) -> Result<&DatasetSpec> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ForecastError::DatasetNotFound {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.datasets.iter().map(|d| d.name.clone()).collect()
    }

    pub fn datasets(&self) -> &[DatasetSpec] {
        &self.datasets
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

fn dataset_spec(formatted: &Path, module: &str, name: &str, entry: &Table) -> Result<DatasetSpec> {
    let frequency = match entry.get("frequency").and_then(Value::as_str) {
        Some(code) => code.parse()?,
        None => DEFAULT_FREQUENCY,
    };
    let seasonality = match entry.get("seasonality") {
        Some(value) => value
            .as_integer()
            .filter(|s| *s >= 1)
            .map(|s| s as usize)
            .ok_or_else(|| {
                ForecastError::ConfigError(format!(
                    "{}.{}: seasonality must be a positive integer",
                    module, name
                ))
            })?,
        None => DEFAULT_SEASONALITY,
    };
    let group = entry
        .get("group")
        .and_then(Value::as_str)
        .map(DatasetGroup::parse)
        .unwrap_or(DatasetGroup::Other);
    let table_name = entry
        .get("table_name")
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_string();
    let display_name = entry
        .get("display_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| table_name.clone());

    Ok(DatasetSpec {
        name: name.to_string(),
        module: module.to_string(),
        path: formatted.join(module).join(format!("{}.parquet", name)),
        frequency,
        seasonality,
        group,
        table_name,
        display_name,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "statistical")]
    Statistical,
    #[serde(rename = "neural-auto")]
    NeuralAuto,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Statistical => f.write_str("statistical"),
            ModelFamily::NeuralAuto => f.write_str("neural-auto"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    library: String,
    family: ModelFamily,
    constructor: String,
    #[serde(default)]
    params: Table,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub library: String,
    pub family: ModelFamily,
    pub constructor: String,
    /// Base parameters, possibly holding `{placeholder}` strings
    pub params: Table,
}

/// Runtime values substituted into model parameters
#[derive(Debug, Clone, Copy)]
pub struct ParamContext {
    pub season_length: usize,
    pub horizon: usize,
    pub frequency: Frequency,
}

impl ModelSpec {
    /// Parameters with every placeholder replaced
    pub fn resolve_params(&self, ctx: &ParamContext) -> Table {
        self.params
            .iter()
            .map(|(key, value)| (key.clone(), resolve_value(value, ctx)))
            .collect()
    }
}

fn resolve_value(value: &Value, ctx: &ParamContext) -> Value {
    match value.as_str() {
        Some("{season_length}") => Value::Integer(ctx.season_length as i64),
        Some("{horizon}") => Value::Integer(ctx.horizon as i64),
        Some("{frequency}") => Value::String(ctx.frequency.code().to_string()),
        _ => value.clone(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: Vec<ModelSpec>,
}

impl ModelCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ForecastError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut root: Table = text.parse()?;
        let Some(Value::Table(entries)) = root.remove("models") else {
            return Err(ForecastError::ConfigError(
                "model catalog has no [models] table".to_string(),
            ));
        };
        let mut models = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            let entry: ModelEntry = entry
                .try_into()
                .map_err(|e| ForecastError::ConfigError(format!("models.{}: {}", name, e)))?;
            models.push(ModelSpec {
                name,
                library: entry.library,
                family: entry.family,
                constructor: entry.constructor,
                params: entry.params,
            });
        }
        Ok(Self { models })
    }

    pub fn resolve(&self, name: &str) -> Result<&ModelSpec> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| ForecastError::ModelNotFound {
                name: name.to_string(),
                known: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }
}
