//! Entry point for the gridzone application.
//! Handles CLI parsing, logging setup, and dispatches the pipeline stages.

use clap::Parser;
use gridzone::config::Stage;
use gridzone::metadata::inspect_source;
use gridzone::parallel::get_parallel_info;
use gridzone::report::RunReport;
use gridzone::stages::{self, convert, extract, fill, merge, stats};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
mod cli;

use cli::{Cli, Command};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_target(false).init();

    if let Command::Inspect { file, variable } = &cli.command {
        inspect_source(file, variable)?.print();
        return Ok(());
    }

    let Some((config, stage_list)) = cli.pipeline_config()? else {
        return Ok(());
    };
    config.validate(&stage_list)?;
    config.parallel.setup_global_pool()?;
    get_parallel_info().log();

    info!(
        "gridzone {}: {} -> {}",
        env!("CARGO_PKG_VERSION"),
        config.input_dir.display(),
        config.output_dir.display()
    );

    let report = match &cli.command {
        Command::Run { .. } => stages::run_all(&config)?,
        _ => {
            let mut report = RunReport::default();
            for stage in &stage_list {
                let (input, output) = (&config.input_dir, &config.output_dir);
                report.push(match stage {
                    Stage::Extract => extract::run(&config, input, output)?,
                    Stage::Fill => fill::run(&config, input, output)?,
                    Stage::Stats => stats::run(&config, input, output)?,
                    Stage::Convert => convert::run(&config, input)?,
                    Stage::Merge => merge::run(&config, input, output)?,
                });
            }
            report
        }
    };

    report.log_summary();
    if let Some(path) = &cli.report {
        report.write_json(path)?;
    }

    if report.has_failures() {
        let failed: usize = report.stages.iter().map(|s| s.failed).sum();
        error!("{} units failed", failed);
        std::process::exit(2);
    }
    Ok(())
}
