// `strata tables`: list tables and their columns.

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use strata_database::{db_session_sync, Database, DbError};

use crate::commands::{finish, resolve_database};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TablesResult {
    pub tables: Vec<TableEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableEntry {
    pub name: String,
    pub columns: Vec<String>,
}

pub fn run(args: TablesArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = resolve_database().and_then(|db| list_tables(&db));
    finish(format, result, format_human)
}

pub fn list_tables(db: &Database) -> anyhow::Result<TablesResult> {
    let tables = db_session_sync(db, |session| {
        let mut tables = Vec::new();
        for name in session.table_names()? {
            let columns = session.column_names(&name)?;
            tables.push(TableEntry { name, columns });
        }
        Ok::<_, DbError>(tables)
    })
    .context("failed to inspect schema")?;
    Ok(TablesResult { tables })
}

fn format_human(result: &TablesResult) -> String {
    if result.tables.is_empty() {
        return "No tables.".into();
    }

    let mut lines = vec![format!("{} table(s)", result.tables.len())];
    for table in &result.tables {
        lines.push(format!("  {} ({})", table.name, table.columns.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_tables_with_columns() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let db = Database::sqlite(temp.path().join("tables.db").display().to_string())
            .expect("sqlite url should be valid");
        db_session_sync(&db, |session| {
            session.execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT)", &[])
        })
        .expect("create table");

        let result = list_tables(&db).expect("inspection should succeed");
        assert_eq!(result.tables.len(), 1);
        assert_eq!(result.tables[0].name, "people");
        assert_eq!(result.tables[0].columns, vec!["id", "name"]);
        assert_eq!(format_human(&result), "1 table(s)\n  people (id, name)");
    }

    #[test]
    fn empty_database_has_no_tables() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let db = Database::sqlite(temp.path().join("empty.db").display().to_string())
            .expect("sqlite url should be valid");

        let result = list_tables(&db).expect("inspection should succeed");
        assert_eq!(format_human(&result), "No tables.");
    }
}
