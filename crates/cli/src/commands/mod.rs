// CLI subcommand dispatch.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use strata_database::Database;
use strata_dependency::Container;

use crate::output::{self, OutputFormat};

pub mod check;
pub mod migrate;
pub mod tables;

#[derive(Subcommand)]
pub enum Command {
    /// Run a health query through both the blocking and async pools
    Check(check::CheckArgs),
    /// List tables and their columns
    Tables(tables::TablesArgs),
    /// Apply `<version>_<name>.sql` migrations from a directory
    Migrate(migrate::MigrateArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Check(args) => check::run(args),
        Command::Tables(args) => tables::run(args),
        Command::Migrate(args) => migrate::run(args),
    }
}

/// The database configured by the process environment.
pub(crate) fn resolve_database() -> anyhow::Result<Arc<Database>> {
    Container::global()
        .persisted::<Database>()
        .context("failed to resolve database from environment")
}

pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// Prints a command's result, or its mapped error on failure.
pub(crate) fn finish<T, F>(
    format: OutputFormat,
    result: anyhow::Result<T>,
    human_fn: F,
) -> anyhow::Result<()>
where
    T: serde::Serialize,
    F: FnOnce(&T) -> String,
{
    match result {
        Ok(value) => {
            output::print_output(format, &value, human_fn)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}
