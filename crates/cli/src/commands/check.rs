// `strata check`: verify both pools can reach the database.

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use strata_database::{Database, DatabaseType};

use crate::commands::{block_on, finish, resolve_database};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub database_type: DatabaseType,
    pub url: String,
    pub path: String,
    pub schema_version: i64,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = resolve_database().and_then(|db| check(&db));
    finish(format, result, format_human)
}

pub fn check(db: &Database) -> anyhow::Result<CheckResult> {
    db.check_health().context("blocking pool health query failed")?;
    block_on(async {
        let health = db.async_check_health().await;
        db.close().await;
        health
    })?
    .context("async pool health query failed")?;
    let schema_version = db.schema_version().context("failed to read schema version")?;

    Ok(CheckResult {
        database_type: db.database_type(),
        url: db.url().to_string(),
        path: db.path().display().to_string(),
        schema_version,
    })
}

fn format_human(result: &CheckResult) -> String {
    [
        format!("{} database at {}", result.database_type, result.path),
        "  blocking pool:  ok".to_string(),
        "  async pool:     ok".to_string(),
        format!("  schema version: {}", result.schema_version),
    ]
    .join("\n")
}
