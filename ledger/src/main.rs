//! `ledger` entry point: pull, compact, enrich, or replay Strava activities.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::process::ExitCode;

use clap::Parser;
use ledger::config::PipelineConfig;
use ledger::domain::PipelineError;
use ledger::inbound::{Cli, execute};
use tokio::runtime::Builder;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Exit status for missing or invalid configuration.
const CONFIGURATION_EXIT: u8 = 2;

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&cli)) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(%error, "ledger command failed");
            exit_code(&error)
        }
    }
}

async fn run(cli: &Cli) -> Result<ledger::inbound::CommandReport, PipelineError> {
    let config = PipelineConfig::load()?;
    execute(&cli.command, &config).await
}

fn exit_code(error: &PipelineError) -> ExitCode {
    if error.is_configuration() {
        ExitCode::from(CONFIGURATION_EXIT)
    } else {
        ExitCode::FAILURE
    }
}

fn init_tracing() {
    if let Err(error) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %error, "tracing init failed");
    }
}
