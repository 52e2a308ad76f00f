mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use endpoints::config::ValidationError;
use endpoints::errors::EndpointError;
use shared::metrics_defs::MetricDef;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use telemetry::TelemetryError;

#[derive(Parser)]
#[command(about = "Cookie sync and setuid server")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve /cookie_sync and /setuid
    Run {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// List every metric the server emits
    Metrics,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid server config: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Run { config } => match run(&config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("cookiesync: {e}");
                ExitCode::FAILURE
            }
        },
        CliCommand::Metrics => {
            print_metrics();
            ExitCode::SUCCESS
        }
    }
}

fn run(path: &Path) -> Result<(), CliError> {
    let config = Config::from_file(path)?;
    config.server.validate()?;

    let _sentry = telemetry::init_logging(config.common.logging.as_ref());
    telemetry::init_metrics(config.common.metrics.as_ref())?;

    tracing::info!(
        bidders = config.server.bidders.len(),
        "starting cookiesync"
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(endpoints::run(config.server))?;
    Ok(())
}

fn all_metrics() -> impl Iterator<Item = &'static MetricDef> {
    usersync::metrics_defs::ALL_METRICS
        .iter()
        .chain(endpoints::metrics_defs::ALL_METRICS)
}

fn print_metrics() {
    for metric in all_metrics() {
        println!("{}", metric.describe());
    }
}
