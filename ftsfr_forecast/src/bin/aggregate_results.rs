//! Collect every result file into `results_all.csv` and `results_all.tex`

use clap::Parser;
use ftsfr_forecast::aggregate::{aggregate, rank_models};
use ftsfr_forecast::cli::{exit_with_error, AggregateCli};
use ftsfr_forecast::telemetry::init_tracing;

fn main() {
    let cli = AggregateCli::parse();
    init_tracing(cli.common.debug);
    if let Err(err) = run(&cli) {
        exit_with_error(err, cli.common.debug);
    }
}

fn run(cli: &AggregateCli) -> anyhow::Result<()> {
    let settings = cli.common.settings()?;
    let report = aggregate(&settings.forecasting_dir())?;

    println!("{} result rows -> {}", report.records.len(), report.csv_path.display());
    let (best, worst) = rank_models(&report.summaries);
    println!("Best models by mean MASE:");
    for (model, mase) in &best {
        println!("  {:<28} {:.4}", model, mase);
    }
    println!("Worst models by mean MASE:");
    for (model, mase) in &worst {
        println!("  {:<28} {:.4}", model, mase);
    }
    Ok(())
}
