use std::env::VarError;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::ConfigError;
use crate::error::DbError;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub type SyncPool = r2d2::Pool<SqliteConnectionManager>;
pub type SyncConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Sizing shared by the blocking and the async pool of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_fn(&|key: &str| std::env::var(key))
    }

    pub fn from_env_fn<F>(env: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let max_connections =
            parse_var(env, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                var: "DATABASE_MAX_CONNECTIONS".into(),
                value: "0".into(),
                reason: "pool needs at least one connection".into(),
            });
        }

        let acquire_timeout_secs =
            parse_var(env, "DATABASE_ACQUIRE_TIMEOUT_SECS", DEFAULT_ACQUIRE_TIMEOUT_SECS)?;
        let busy_timeout_ms = parse_var(env, "DATABASE_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;

        Ok(Self {
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        })
    }
}

fn parse_var<F, T>(env: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
    T: FromStr,
    T::Err: Display,
{
    match env(key) {
        Ok(value) => value.trim().parse::<T>().map_err(|error| ConfigError::InvalidValue {
            var: key.to_string(),
            value,
            reason: error.to_string(),
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var: key.to_string() }),
    }
}

/// Blocking pool. Connections open on first checkout.
pub fn create_sync_pool(path: &Path, config: &PoolConfig) -> SyncPool {
    let busy_timeout = config.busy_timeout;
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )
    });

    r2d2::Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(0))
        .connection_timeout(config.acquire_timeout)
        .build_unchecked(manager)
}

/// Async pool. Must be called from within a tokio runtime; connections open
/// on first acquire.
pub fn create_async_pool(path: &Path, config: &PoolConfig) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_lazy_with(options)
}

pub fn check_sync_pool_health(pool: &SyncPool) -> Result<(), DbError> {
    let conn = pool.get()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}

pub async fn check_async_pool_health(pool: &SqlitePool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
