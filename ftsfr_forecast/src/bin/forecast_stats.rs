//! Benchmark one statistical model on one dataset
//!
//! ```text
//! forecast_stats --dataset ftsfr_treas_sf_basis --model auto_ets
//! ```

use anyhow::Context;
use clap::Parser;
use ftsfr_forecast::cli::{exit_with_error, StatsCli};
use ftsfr_forecast::telemetry::init_tracing;
use ftsfr_forecast::{Harness, RunOutcome};

fn main() {
    let cli = StatsCli::parse();
    init_tracing(cli.common.debug);
    if let Err(err) = run(&cli) {
        exit_with_error(err, cli.common.debug);
    }
}

fn run(cli: &StatsCli) -> anyhow::Result<()> {
    let settings = cli.common.settings()?;
    let harness = Harness::from_settings(settings)?;
    let outcome = harness
        .forecast(&cli.dataset, &cli.model)
        .with_context(|| format!("{}/{}", cli.dataset, cli.model))?;
    if let RunOutcome::Completed { path, row } = &outcome {
        println!(
            "{} on {}: MASE {:.4}, RMSE {:.4}, R2oos {:.4} -> {}",
            row.model_name,
            row.dataset_name,
            row.mase,
            row.rmse,
            row.r2oos,
            path.display()
        );
    }
    Ok(())
}
