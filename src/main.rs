//! Merchant Data Grabber
//!
//! Exports yesterday's merchant analytics datasets, zips them and delivers the
//! archive. Runs once, or repeatedly when the configuration has a `schedule`.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

use merchant_data_grabber::{logging, schedule, Config, Pipeline};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "merchant-data-grabber")]
#[command(about = "Automate data grabber from the merchant analytics portal", long_about = None)]
struct Args {
    /// Path to the configuration JSON file
    #[arg(long, value_name = "FILE")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // No log file yet, so configuration problems go to stderr
    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {:?}: {:#}", args.config, e);
            return ExitCode::FAILURE;
        }
    };

    let (dispatch, _guard) = match logging::build_dispatch(&config.log_dir) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Failed to set up logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if run(config).with_subscriber(dispatch).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(config: Config) -> bool {
    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Runtime Error Message: {:?}", e);
            return false;
        }
    };

    match &config.schedule {
        Some(every) => {
            let period = match every.period() {
                Ok(period) => period,
                Err(e) => {
                    error!("Runtime Error Message: {:?}", e);
                    return false;
                }
            };
            let pipeline = &pipeline;
            schedule::run_every(period, shutdown_signal(), move || pipeline.run()).await;
            true
        }
        None => match pipeline.run().await {
            Ok(report) => {
                if report.archive.is_none() {
                    warn!("Nothing was delivered");
                }
                info!("Processing completed successfully!");
                true
            }
            Err(e) => {
                error!("Runtime Error Message: {:?}", e);
                false
            }
        },
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
