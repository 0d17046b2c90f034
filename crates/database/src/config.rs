// Database configuration read from the environment.
//
// `DATABASE_TYPE` picks the backend and `DATABASE_<TYPE>_URL` its location.
// Pool tuning lives in `pool.rs` and is read alongside.

use std::env::VarError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::PoolConfig;

pub const DATABASE_TYPE_VAR: &str = "DATABASE_TYPE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(String),

    #[error("{var} is not valid unicode")]
    NotUnicode { var: String },

    #[error("unsupported database type `{0}`; expected one of: SQLITE")]
    UnsupportedType(String),

    #[error("invalid value `{value}` for {var}: {reason}")]
    InvalidValue { var: String, value: String, reason: String },

    #[error("invalid database url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Backend tag selecting which driver family serves a [`crate::Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseType {
    Sqlite,
}

impl DatabaseType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "SQLITE",
        }
    }

    /// Name of the variable holding this backend's connection URL.
    pub const fn url_var(self) -> &'static str {
        match self {
            Self::Sqlite => "DATABASE_SQLITE_URL",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SQLITE" => Ok(Self::Sqlite),
            _ => Err(ConfigError::UnsupportedType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub database_type: DatabaseType,
    pub url: String,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    pub fn new(database_type: DatabaseType, url: impl Into<String>) -> Self {
        Self { database_type, url: url.into(), pool: PoolConfig::default() }
    }

    pub fn sqlite(url: impl Into<String>) -> Self {
        Self::new(DatabaseType::Sqlite, url)
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `DATABASE_TYPE` | *(required)* |
    /// | `DATABASE_SQLITE_URL` | *(required when type is `SQLITE`)* |
    /// | `DATABASE_MAX_CONNECTIONS` | `10` |
    /// | `DATABASE_ACQUIRE_TIMEOUT_SECS` | `10` |
    /// | `DATABASE_BUSY_TIMEOUT_MS` | `5000` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    pub fn from_env_fn<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let database_type: DatabaseType = required_var(&env, DATABASE_TYPE_VAR)?.parse()?;
        let url = required_var(&env, database_type.url_var())?;
        let pool = PoolConfig::from_env_fn(&env)?;

        let config = Self { database_type, url, pool };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.database_type {
            DatabaseType::Sqlite => sqlite_path_from_url(&self.url).map(|_| ()),
        }
    }

    /// Filesystem path of the SQLite database named by `url`.
    pub fn sqlite_path(&self) -> Result<PathBuf, ConfigError> {
        sqlite_path_from_url(&self.url)
    }
}

pub(crate) fn required_var<F>(env: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match env(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) | Err(VarError::NotPresent) => Err(ConfigError::MissingVar(key.to_string())),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var: key.to_string() }),
    }
}

/// Accepts `sqlite://path`, `sqlite:path` or a bare path. Query strings are
/// ignored; connection options come from [`PoolConfig`].
pub(crate) fn sqlite_path_from_url(url: &str) -> Result<PathBuf, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl { url: url.to_string(), reason: reason.into() };

    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    let path = rest.split('?').next().unwrap_or_default();

    if path.contains("://") {
        return Err(invalid("only sqlite urls are supported"));
    }
    if path.is_empty() {
        return Err(invalid("missing database path"));
    }
    if path == ":memory:" || path.starts_with("file::memory:") {
        return Err(invalid(
            "in-memory databases cannot be shared between the blocking and async pools",
        ));
    }

    Ok(PathBuf::from(path))
}
