// strata CLI entry point.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;

const LOG_FILTER_VAR: &str = "STRATA_LOG_FILTER";

#[derive(Parser)]
#[command(name = "strata", about = "Inspect and migrate a strata database")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_FILTER_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match commands::run(cli.command) {
        Ok(()) => exit_code::ExitCode::Success.into(),
        Err(error) => exit_code::ExitCode::from_error(&error).into(),
    }
}
