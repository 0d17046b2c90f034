use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use sqlx::sqlite::SqlitePool;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::{ConfigError, DatabaseConfig, DatabaseType};
use crate::error::DbError;
use crate::migrations::{self, Migration};
use crate::pool::{
    check_async_pool_health, check_sync_pool_health, create_async_pool, create_sync_pool,
    SyncPool,
};
use crate::session::{AsyncSession, SyncSession};

/// Handle to one configured database.
///
/// Owns a blocking and an async pool over the same file. Each pool is
/// built the first time a session of its convention is requested, so a
/// handle used only from async code never opens blocking connections.
pub struct Database {
    config: DatabaseConfig,
    path: PathBuf,
    sync_pool: OnceLock<SyncPool>,
    async_pool: OnceCell<SqlitePool>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let path = match config.database_type {
            DatabaseType::Sqlite => config.sqlite_path()?,
        };
        Ok(Self { config, path, sync_pool: OnceLock::new(), async_pool: OnceCell::new() })
    }

    pub fn sqlite(url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(DatabaseConfig::sqlite(url))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(DatabaseConfig::from_env()?)
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn database_type(&self) -> DatabaseType {
        self.config.database_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn sync_pool(&self) -> Result<&SyncPool, DbError> {
        if let Some(pool) = self.sync_pool.get() {
            return Ok(pool);
        }
        self.ensure_parent_dir()?;
        Ok(self.sync_pool.get_or_init(|| {
            debug!(path = %self.path.display(), "creating blocking pool");
            create_sync_pool(&self.path, &self.config.pool)
        }))
    }

    pub async fn async_pool(&self) -> Result<&SqlitePool, DbError> {
        self.async_pool
            .get_or_try_init(|| async {
                self.ensure_parent_dir()?;
                debug!(path = %self.path.display(), "creating async pool");
                Ok::<_, DbError>(create_async_pool(&self.path, &self.config.pool))
            })
            .await
    }

    /// Opens a blocking session. No connection is checked out until the
    /// session's first operation.
    pub fn sync_session(&self) -> Result<SyncSession, DbError> {
        Ok(SyncSession::new(self.sync_pool()?.clone()))
    }

    pub async fn async_session(&self) -> Result<AsyncSession, DbError> {
        Ok(AsyncSession::new(self.async_pool().await?.clone()))
    }

    /// Applies pending migrations and returns the schema version.
    pub fn upgrade_db(&self, migrations: &[Migration]) -> Result<i64, DbError> {
        let mut conn = self.sync_pool()?.get()?;
        migrations::apply_blocking(&mut conn, migrations)
    }

    pub async fn async_upgrade_db(&self, migrations: &[Migration]) -> Result<i64, DbError> {
        migrations::apply_async(self.async_pool().await?, migrations).await
    }

    /// Highest applied migration version, 0 when none.
    pub fn schema_version(&self) -> Result<i64, DbError> {
        let conn = self.sync_pool()?.get()?;
        migrations::current_version_blocking(&conn)
    }

    pub fn check_health(&self) -> Result<(), DbError> {
        check_sync_pool_health(self.sync_pool()?)
    }

    pub async fn async_check_health(&self) -> Result<(), DbError> {
        check_async_pool_health(self.async_pool().await?).await
    }

    /// Closes the async pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        if let Some(pool) = self.async_pool.get() {
            pool.close().await;
        }
    }

    fn ensure_parent_dir(&self) -> Result<(), DbError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("database_type", &self.config.database_type)
            .field("url", &self.config.url)
            .field("sync_pool", &self.sync_pool.get().is_some())
            .field("async_pool", &self.async_pool.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_unusable_urls() {
        let error = Database::sqlite("sqlite://:memory:").expect_err("memory url");
        assert!(matches!(error, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn pools_are_created_on_demand() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("nested/app.db");
        let db = Database::sqlite(format!("sqlite://{}", path.display())).expect("valid url");

        assert!(!path.parent().expect("parent").exists());
        db.check_health().expect("health check");
        assert!(path.exists());
        assert_eq!(db.path(), path.as_path());
        assert_eq!(db.database_type(), DatabaseType::Sqlite);
    }

    #[test]
    fn schema_version_starts_at_zero() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let db = Database::sqlite(dir.path().join("app.db").display().to_string()).expect("db");
        assert_eq!(db.schema_version().expect("version"), 0);

        let version = db
            .upgrade_db(&[Migration::new(1, "things", "CREATE TABLE things (id INTEGER);")])
            .expect("upgrade");
        assert_eq!(version, 1);
        assert_eq!(db.schema_version().expect("version"), 1);
    }

    #[tokio::test]
    async fn async_health_check_uses_the_same_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let db = Database::sqlite(dir.path().join("app.db").display().to_string()).expect("db");

        db.async_upgrade_db(&[Migration::new(1, "things", "CREATE TABLE things (id INTEGER);")])
            .await
            .expect("async upgrade");
        db.async_check_health().await.expect("async health");
        assert_eq!(db.schema_version().expect("blocking view of version"), 1);
        db.close().await;
    }
}
