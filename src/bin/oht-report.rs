//! Daily OHT transfer report runner.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use oht_report::pipeline::{self, WeeklyStatus};
use oht_report::PipelineConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oht-report")]
#[command(version)]
#[command(
    about = "Enrich a daily OHT transfer log and update the weekly report",
    long_about = None
)]
struct Cli {
    /// JSON configuration file (omitted keys use defaults)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory searched for the TransferTime log
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory holding the report workbook
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Shelf reference JSON
    #[arg(long, value_name = "FILE")]
    shelf: Option<PathBuf>,

    /// Number of vehicles in the fleet
    #[arg(long, value_name = "N")]
    fleet_size: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oht_report=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

fn build_config(cli: &Cli) -> oht_report::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
        if cli.shelf.is_none() && cli.config.is_none() {
            config.shelf_reference = dir.join("FabShelf.json");
        }
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(shelf) = &cli.shelf {
        config.shelf_reference = shelf.clone();
    }
    if let Some(n) = cli.fleet_size {
        config.fleet_size = n;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let report = match build_config(&cli).and_then(|config| pipeline::run(&config)) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let weekly = match &report.weekly {
        WeeklyStatus::Inserted => "updated".to_string(),
        WeeklyStatus::AlreadyPresent => "already had this day".to_string(),
        WeeklyStatus::Failed(reason) => format!("not updated ({reason})"),
    };
    for skipped in &report.skipped {
        eprintln!("warning: {} not written: {}", skipped.step, skipped.reason);
    }
    println!(
        "{}: {} transfers, {}/{} OHTs ({:.2}%), {} dropped, weekly report {} -> {}",
        report.date_tag,
        report.transfers,
        report.utilization.used_entities,
        report.utilization.total_entities,
        report.utilization.utilization_pct,
        report.data_quality.dropped_durations,
        weekly,
        report.workbook.display()
    );
    ExitCode::SUCCESS
}
