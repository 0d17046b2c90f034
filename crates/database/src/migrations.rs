// Versioned schema upgrades, recorded in `schema_migrations`.
//
// Each migration runs in its own transaction together with the row that
// records it, so a failed migration leaves the previous version intact.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};
use sqlx::sqlite::SqlitePool;
use tracing::{info, warn};

use crate::error::DbError;
use crate::model::Model;

const MIGRATION_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version     INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    applied_at  TEXT NOT NULL
);
";

const CURRENT_VERSION_SQL: &str = "SELECT COALESCE(MAX(version), 0) FROM schema_migrations";

const RECORDED_VERSIONS_SQL: &str = "SELECT version FROM schema_migrations";

const RECORD_MIGRATION_SQL: &str =
    "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, datetime('now'))";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self { version, name: name.into(), sql: sql.into() }
    }

    /// Creates `M`'s table from its column list.
    pub fn create_table<M: Model>(version: i64) -> Self {
        Self::new(version, format!("create_{}", M::TABLE), M::create_table_sql())
    }

    /// Loads `<version>_<name>.sql` files from `dir`, ordered by version.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>, DbError> {
        let mut migrations = Vec::new();

        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }

            let invalid = |reason: &str| DbError::InvalidMigrationFile {
                path: path.clone(),
                reason: reason.to_string(),
            };
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| invalid("file name is not valid unicode"))?;
            let (version, name) = stem
                .split_once('_')
                .ok_or_else(|| invalid("expected `<version>_<name>.sql`"))?;
            let version = version
                .parse::<i64>()
                .map_err(|_| invalid("version prefix is not an integer"))?;
            if version <= 0 {
                return Err(invalid("version must be positive"));
            }

            let sql = fs::read_to_string(&path)?;
            migrations.push(Self::new(version, name, sql));
        }

        sorted(migrations)
    }
}

fn sorted(mut migrations: Vec<Migration>) -> Result<Vec<Migration>, DbError> {
    migrations.sort_by_key(|migration| migration.version);
    let mut seen = HashSet::new();
    for migration in &migrations {
        if !seen.insert(migration.version) {
            return Err(DbError::DuplicateMigration(migration.version));
        }
    }
    Ok(migrations)
}

/// Migrations above the recorded version, in version order.
///
/// Versions below the recorded maximum that were never applied are returned
/// separately; they are out of order and will not run.
fn split_pending<'a>(
    migrations: &'a [Migration],
    recorded: &HashSet<i64>,
) -> (Vec<&'a Migration>, Vec<i64>) {
    let current_version = recorded.iter().copied().max().unwrap_or(0);
    let mut pending = Vec::new();
    let mut skipped = Vec::new();
    for migration in migrations {
        if migration.version > current_version {
            pending.push(migration);
        } else if !recorded.contains(&migration.version) {
            skipped.push(migration.version);
        }
    }
    (pending, skipped)
}

fn warn_skipped(skipped: &[i64], current_version: i64) {
    for &version in skipped {
        warn!(version, current_version, "skipping unapplied migration below current version");
    }
}

/// Applies pending migrations over a blocking connection and returns the
/// resulting schema version.
pub(crate) fn apply_blocking(
    conn: &mut Connection,
    migrations: &[Migration],
) -> Result<i64, DbError> {
    let migrations = sorted(migrations.to_vec())?;
    conn.execute_batch(MIGRATION_TABLE_SQL)?;
    let recorded = recorded_versions_blocking(conn)?;
    let mut current_version = recorded.iter().copied().max().unwrap_or(0);

    let (pending, skipped) = split_pending(&migrations, &recorded);
    warn_skipped(&skipped, current_version);
    for migration in pending {
        apply_one_blocking(conn, migration).map_err(|error| DbError::Migration {
            version: migration.version,
            source: Box::new(error),
        })?;
        info!(version = migration.version, name = %migration.name, "applied migration");
        current_version = migration.version;
    }

    Ok(current_version)
}

fn recorded_versions_blocking(conn: &Connection) -> Result<HashSet<i64>, DbError> {
    let mut stmt = conn.prepare(RECORDED_VERSIONS_SQL)?;
    let versions = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<Result<HashSet<i64>, rusqlite::Error>>()?;
    Ok(versions)
}

fn apply_one_blocking(conn: &mut Connection, migration: &Migration) -> Result<(), DbError> {
    let tx = conn.transaction()?;
    tx.execute_batch(&migration.sql)?;
    tx.execute(RECORD_MIGRATION_SQL, params![migration.version, migration.name])?;
    tx.commit()?;
    Ok(())
}

pub(crate) async fn apply_async(
    pool: &SqlitePool,
    migrations: &[Migration],
) -> Result<i64, DbError> {
    let migrations = sorted(migrations.to_vec())?;
    sqlx::raw_sql(MIGRATION_TABLE_SQL).execute(pool).await?;
    let recorded: HashSet<i64> = sqlx::query_scalar::<_, i64>(RECORDED_VERSIONS_SQL)
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();
    let mut current_version = recorded.iter().copied().max().unwrap_or(0);

    let (pending, skipped) = split_pending(&migrations, &recorded);
    warn_skipped(&skipped, current_version);
    for migration in pending {
        apply_one_async(pool, migration).await.map_err(|error| DbError::Migration {
            version: migration.version,
            source: Box::new(error),
        })?;
        info!(version = migration.version, name = %migration.name, "applied migration");
        current_version = migration.version;
    }

    Ok(current_version)
}

async fn apply_one_async(pool: &SqlitePool, migration: &Migration) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    sqlx::raw_sql(&migration.sql).execute(&mut *tx).await?;
    sqlx::query(RECORD_MIGRATION_SQL)
        .bind(migration.version)
        .bind(migration.name.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub(crate) fn current_version_blocking(conn: &Connection) -> Result<i64, DbError> {
    conn.execute_batch(MIGRATION_TABLE_SQL)?;
    Ok(conn.query_row(CURRENT_VERSION_SQL, [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrations() -> Vec<Migration> {
        vec![
            Migration::new(2, "add_email", "ALTER TABLE people ADD COLUMN email TEXT;"),
            Migration::new(1, "create_people", "CREATE TABLE people (name TEXT NOT NULL);"),
        ]
    }

    #[test]
    fn applies_in_version_order_and_records_each() {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        let version = apply_blocking(&mut conn, &migrations()).expect("migrations apply");
        assert_eq!(version, 2);

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count query");
        assert_eq!(recorded, 2);
        conn.execute("INSERT INTO people (name, email) VALUES ('a', 'a@x')", [])
            .expect("both migrations applied");
    }

    #[test]
    fn reapplying_is_a_no_op() {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        apply_blocking(&mut conn, &migrations()).expect("first apply");
        let version = apply_blocking(&mut conn, &migrations()).expect("second apply");
        assert_eq!(version, 2);
        assert_eq!(current_version_blocking(&conn).expect("version"), 2);
    }

    #[test]
    fn failed_migration_keeps_previous_version() {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        let mut broken = migrations();
        broken.push(Migration::new(3, "broken", "CREATE TABLE people (name TEXT);"));

        let error = apply_blocking(&mut conn, &broken).expect_err("duplicate table should fail");
        assert!(matches!(error, DbError::Migration { version: 3, .. }));
        assert_eq!(current_version_blocking(&conn).expect("version"), 2);
    }

    #[test]
    fn split_pending_separates_new_and_out_of_order_versions() {
        let all = vec![
            Migration::new(1, "one", "SELECT 1;"),
            Migration::new(2, "two", "SELECT 1;"),
            Migration::new(3, "three", "SELECT 1;"),
            Migration::new(4, "four", "SELECT 1;"),
        ];
        let recorded: HashSet<i64> = [1, 3].into_iter().collect();

        let (pending, skipped) = split_pending(&all, &recorded);
        let pending: Vec<i64> = pending.iter().map(|migration| migration.version).collect();
        assert_eq!(pending, vec![4]);
        assert_eq!(skipped, vec![2]);
    }

    #[test]
    fn out_of_order_migration_is_not_applied() {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        let first = vec![
            Migration::new(1, "create_people", "CREATE TABLE people (name TEXT);"),
            Migration::new(3, "create_pets", "CREATE TABLE pets (name TEXT);"),
        ];
        assert_eq!(apply_blocking(&mut conn, &first).expect("first apply"), 3);

        let mut late = first.clone();
        late.push(Migration::new(2, "create_places", "CREATE TABLE places (name TEXT);"));
        assert_eq!(apply_blocking(&mut conn, &late).expect("second apply"), 3);

        let places: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'places'",
                [],
                |row| row.get(0),
            )
            .expect("schema query");
        assert_eq!(places, 0);
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        let duplicated = vec![Migration::new(1, "a", "SELECT 1;"), Migration::new(1, "b", "SELECT 1;")];
        let error = apply_blocking(&mut conn, &duplicated).expect_err("duplicates rejected");
        assert!(matches!(error, DbError::DuplicateMigration(1)));
    }

    #[test]
    fn load_dir_parses_versions_and_skips_other_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("0002_add_email.sql"), "ALTER TABLE people ADD email TEXT;")
            .expect("write v2");
        fs::write(dir.path().join("0001_create_people.sql"), "CREATE TABLE people (name TEXT);")
            .expect("write v1");
        fs::write(dir.path().join("README.md"), "notes").expect("write readme");

        let loaded = Migration::load_dir(dir.path()).expect("load dir");
        let versions: Vec<(i64, &str)> =
            loaded.iter().map(|migration| (migration.version, migration.name.as_str())).collect();
        assert_eq!(versions, vec![(1, "create_people"), (2, "add_email")]);
    }

    #[test]
    fn load_dir_rejects_unversioned_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("people.sql"), "SELECT 1;").expect("write file");
        let error = Migration::load_dir(dir.path()).expect_err("unversioned file");
        assert!(matches!(error, DbError::InvalidMigrationFile { .. }));
    }
}
