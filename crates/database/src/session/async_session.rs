use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;
use tracing::{debug, warn};

use crate::error::DbError;
use crate::mixins::now;
use crate::model::{
    insert_statement, select_by_key_statement, select_statement, update_statement, Model,
    Statement, COLUMN_NAMES_SQL, TABLE_NAMES_SQL,
};
use crate::value::{bind_values, row_from_sqlx, Row, Value};

/// Async counterpart of [`SyncSession`](crate::SyncSession) over a `sqlx`
/// transaction.
///
/// Cancelling a future that holds the session drops the transaction, which
/// rolls it back and returns the connection to the pool.
pub struct AsyncSession {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    closed: bool,
}

impl AsyncSession {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool, tx: None, closed: false }
    }

    pub fn is_active(&self) -> bool {
        !self.closed
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Sqlite>, DbError> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }
        if self.tx.is_none() {
            let tx = self.pool.begin().await?;
            debug!("session transaction started");
            self.tx = Some(tx);
        }
        self.tx.as_mut().ok_or(DbError::SessionClosed)
    }

    pub async fn insert<M: Model>(&mut self, model: &mut M) -> Result<(), DbError> {
        model.before_insert(now());
        let statement = insert_statement(model)?;
        self.run(&statement).await?;
        Ok(())
    }

    pub async fn update<M: Model>(&mut self, model: &mut M) -> Result<(), DbError> {
        model.before_update(now());
        let statement = update_statement(model)?;
        match self.run(&statement).await? {
            0 => Err(DbError::NotFound { table: M::TABLE }),
            _ => Ok(()),
        }
    }

    pub async fn all<M: Model>(&mut self) -> Result<Vec<M>, DbError> {
        self.fetch(select_statement::<M>(None)?).await
    }

    pub async fn find<M: Model>(&mut self, key: impl Into<Value>) -> Result<Option<M>, DbError> {
        let mut statement = select_by_key_statement::<M>(key.into())?;
        statement.sql.push_str(" LIMIT 1");
        Ok(self.fetch(statement).await?.into_iter().next())
    }

    pub async fn filter_by<M: Model>(
        &mut self,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<M>, DbError> {
        let statement = select_statement::<M>(Some((column, value.into())))?;
        self.fetch(statement).await
    }

    pub async fn first_by<M: Model>(
        &mut self,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Option<M>, DbError> {
        let mut statement = select_statement::<M>(Some((column, value.into())))?;
        statement.sql.push_str(" LIMIT 1");
        Ok(self.fetch(statement).await?.into_iter().next())
    }

    pub async fn refresh<M: Model>(&mut self, model: &mut M) -> Result<(), DbError> {
        let stored = self
            .find::<M>(model.primary_key())
            .await?
            .ok_or(DbError::NotFound { table: M::TABLE })?;
        *model = stored;
        Ok(())
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let tx = self.transaction().await?;
        let result = bind_values(sqlx::query(sql), params).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let tx = self.transaction().await?;
        let rows = bind_values(sqlx::query(sql), params).fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(row_from_sqlx).collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn table_names(&mut self) -> Result<Vec<String>, DbError> {
        self.query(TABLE_NAMES_SQL, &[]).await?.iter().map(|row| row.get_string("name")).collect()
    }

    pub async fn column_names(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        self.query(COLUMN_NAMES_SQL, &[Value::from(table)])
            .await?
            .iter()
            .map(|row| row.get_string("name"))
            .collect()
    }

    /// Commits the open transaction, if any. A failed commit is rolled back
    /// when the transaction guard drops.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tx.commit().await?;
        debug!("session transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), DbError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tx.rollback().await?;
        debug!("session transaction rolled back");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), DbError> {
        let result = self.rollback().await;
        self.closed = true;
        result
    }

    async fn run(&mut self, statement: &Statement) -> Result<u64, DbError> {
        self.execute(&statement.sql, &statement.params).await
    }

    async fn fetch<M: Model>(&mut self, statement: Statement) -> Result<Vec<M>, DbError> {
        self.query(&statement.sql, &statement.params).await?.iter().map(M::from_row).collect()
    }
}

impl Drop for AsyncSession {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("async session dropped with an open transaction; rolling back");
        }
    }
}

impl std::fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSession")
            .field("active", &self.is_active())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
