//! Dataset statistics before and after preprocessing, as CSV and LaTeX

use clap::Parser;
use ftsfr_forecast::cli::{exit_with_error, StatisticsCli};
use ftsfr_forecast::statistics::{collect, write_reports};
use ftsfr_forecast::telemetry::init_tracing;
use ftsfr_forecast::DatasetCatalog;

fn main() {
    let cli = StatisticsCli::parse();
    init_tracing(cli.common.debug);
    if let Err(err) = run(&cli) {
        exit_with_error(err, cli.common.debug);
    }
}

fn run(cli: &StatisticsCli) -> anyhow::Result<()> {
    let settings = cli.common.settings()?;
    let catalog = DatasetCatalog::load(&settings.dataset_catalog, &settings.data_dir)?;
    let stats = collect(&catalog);
    let paper_dir = settings.paper_dir();
    write_reports(&stats, &paper_dir)?;
    println!("{} datasets -> {}", stats.len(), paper_dir.display());
    Ok(())
}
