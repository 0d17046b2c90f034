// `strata migrate`: apply versioned SQL files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use strata_database::{Database, Migration};
use tracing::info;

use crate::commands::{finish, resolve_database};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Directory holding `<version>_<name>.sql` files.
    #[arg(long)]
    dir: PathBuf,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrateResult {
    pub previous_version: i64,
    pub version: i64,
    pub applied: Vec<AppliedMigration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
}

pub fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = resolve_database().and_then(|db| migrate(&db, &args.dir));
    if let Ok(result) = &result {
        if result.applied.is_empty() {
            output::print_warning(format, "UP_TO_DATE", "no pending migrations");
        }
    }
    finish(format, result, format_human)
}

pub fn migrate(db: &Database, dir: &Path) -> anyhow::Result<MigrateResult> {
    let migrations = Migration::load_dir(dir)
        .with_context(|| format!("failed to load migrations from {}", dir.display()))?;
    let previous_version = db.schema_version().context("failed to read schema version")?;
    let version = db.upgrade_db(&migrations).context("failed to apply migrations")?;

    let applied: Vec<AppliedMigration> = migrations
        .into_iter()
        .filter(|migration| migration.version > previous_version && migration.version <= version)
        .map(|migration| AppliedMigration { version: migration.version, name: migration.name })
        .collect();
    info!(previous_version, version, applied = applied.len(), "migrations complete");

    Ok(MigrateResult { previous_version, version, applied })
}

fn format_human(result: &MigrateResult) -> String {
    if result.applied.is_empty() {
        return format!("Schema is up to date at version {}.", result.version);
    }

    let mut lines = vec![format!(
        "Migrated schema from version {} to {}",
        result.previous_version, result.version
    )];
    for migration in &result.applied {
        lines.push(format!("  applied {} {}", migration.version, migration.name));
    }
    lines.join("\n")
}
