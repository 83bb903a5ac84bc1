//! Benchmark one auto-tuned neural model on one dataset
//!
//! ```text
//! forecast_neural --dataset ftsfr_treas_sf_basis --model auto_nhits --n-epochs 5
//! ```

use anyhow::Context;
use clap::Parser;
use ftsfr_forecast::cli::{exit_with_error, NeuralCli};
use ftsfr_forecast::factory::configure_accelerator_env;
use ftsfr_forecast::telemetry::init_tracing;
use ftsfr_forecast::{Harness, RunOutcome};

fn main() {
    configure_accelerator_env();
    let cli = NeuralCli::parse();
    init_tracing(cli.common.debug);
    if let Err(err) = run(&cli) {
        exit_with_error(err, cli.common.debug);
    }
}

fn run(cli: &NeuralCli) -> anyhow::Result<()> {
    let settings = cli.settings()?;
    let harness = Harness::from_settings(settings)?;
    let outcome = harness
        .forecast(&cli.dataset, &cli.model)
        .with_context(|| format!("{}/{}", cli.dataset, cli.model))?;
    if let RunOutcome::Completed { path, row } = &outcome {
        println!(
            "{} on {}: MASE {:.4}, RMSE {:.4}, R2oos {:.4} ({:.1}s) -> {}",
            row.model_name,
            row.dataset_name,
            row.mase,
            row.rmse,
            row.r2oos,
            row.time_taken,
            path.display()
        );
    }
    Ok(())
}
