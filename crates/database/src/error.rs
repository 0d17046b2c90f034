use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to check out a pooled connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("async database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("row has no column `{0}`")]
    MissingColumn(String),

    #[error("column `{column}` holds {found}, expected {expected}")]
    Decode { column: String, expected: &'static str, found: String },

    #[error("table `{table}` has no column named `{column}`")]
    UnknownColumn { table: &'static str, column: String },

    #[error("table `{table}` declares no primary key column")]
    NoPrimaryKey { table: &'static str },

    #[error("model for `{table}` produced {values} values for {columns} columns")]
    ModelShape { table: &'static str, columns: usize, values: usize },

    #[error("no `{table}` row matched the primary key")]
    NotFound { table: &'static str },

    #[error("session is closed")]
    SessionClosed,

    #[error("duplicate migration version {0}")]
    DuplicateMigration(i64),

    #[error("invalid migration file `{}`: {reason}", .path.display())]
    InvalidMigrationFile { path: PathBuf, reason: String },

    #[error("migration v{version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: Box<DbError>,
    },
}
