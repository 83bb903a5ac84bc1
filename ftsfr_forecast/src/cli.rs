//! Command-line surfaces of the four binaries

use crate::config::Settings;
use crate::error::Result;
use crate::registry::{NEURAL_MODELS, STATISTICAL_MODELS};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser};
use std::path::PathBuf;

/// Flags shared by every binary; they override `ftsfr.toml` and the
/// environment
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Verbose logging and full error chains
    #[arg(long)]
    pub debug: bool,

    /// Root of the output tree
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Root of the formatted parquet files
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

impl CommonArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        settings.debug |= self.debug;
    }

    /// Layered settings with these flags on top
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load()?;
        self.apply(&mut settings);
        Ok(settings)
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Benchmark one statistical model on one dataset")]
pub struct StatsCli {
    /// Dataset name, e.g. ftsfr_treas_sf_basis
    #[arg(long)]
    pub dataset: String,

    #[arg(long, value_parser = PossibleValuesParser::new(STATISTICAL_MODELS))]
    pub model: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
#[command(version, about = "Benchmark one auto-tuned neural model on one dataset")]
pub struct NeuralCli {
    #[arg(long)]
    pub dataset: String,

    #[arg(long, value_parser = PossibleValuesParser::new(NEURAL_MODELS))]
    pub model: String,

    /// Trials per hyperparameter search
    #[arg(long)]
    pub num_samples: Option<usize>,

    /// Train each trial for this many epochs instead of its sampled steps
    #[arg(long)]
    pub n_epochs: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl NeuralCli {
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = self.common.settings()?;
        if self.num_samples.is_some() {
            settings.num_samples = self.num_samples;
        }
        if self.n_epochs.is_some() {
            settings.n_epochs = self.n_epochs;
        }
        Ok(settings)
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Collect result files into results_all.csv and a LaTeX table")]
pub struct AggregateCli {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
#[command(version, about = "Descriptive statistics of every catalog dataset")]
pub struct StatisticsCli {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// The error on one line, or its full chain with `debug`
pub fn error_line(err: &anyhow::Error, debug: bool) -> String {
    if debug {
        format!("{:?}", err)
    } else {
        format!("{:#}", err).replace('\n', " ")
    }
}

/// Print `error: ...` to stderr and exit with status 1
pub fn exit_with_error(err: anyhow::Error, debug: bool) -> ! {
    eprintln!("error: {}", error_line(&err, debug));
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parsers_are_well_formed() {
        StatsCli::command().debug_assert();
        NeuralCli::command().debug_assert();
        AggregateCli::command().debug_assert();
        StatisticsCli::command().debug_assert();
    }

    #[test]
    fn stats_rejects_neural_model() {
        let parsed = StatsCli::try_parse_from([
            "forecast_stats",
            "--dataset",
            "ftsfr_demo",
            "--model",
            "auto_nhits",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn neural_flags_override_settings() {
        let cli = NeuralCli::try_parse_from([
            "forecast_neural",
            "--dataset",
            "ftsfr_demo",
            "--model",
            "auto_nhits",
            "--n-epochs",
            "2",
            "--output-dir",
            "/tmp/ftsfr",
        ])
        .unwrap();
        let mut settings = Settings::default();
        cli.common.apply(&mut settings);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/ftsfr"));
        assert_eq!(cli.n_epochs, Some(2));
        assert_eq!(cli.num_samples, None);
    }

    #[test]
    fn error_line_is_single_line() {
        let err = anyhow::anyhow!("no valid series\nafter filtering").context("ftsfr_demo/theta");
        let line = error_line(&err, false);
        assert!(!line.contains('\n'));
        assert!(line.starts_with("ftsfr_demo/theta: no valid series"));
    }
}
