use rusqlite::params_from_iter;
use tracing::{debug, warn};

use crate::error::DbError;
use crate::mixins::now;
use crate::model::{
    insert_statement, select_by_key_statement, select_statement, update_statement, Model,
    Statement, COLUMN_NAMES_SQL, TABLE_NAMES_SQL,
};
use crate::pool::{SyncConnection, SyncPool};
use crate::value::{row_from_rusqlite, Row, Value};

/// Blocking unit of work over one pooled `rusqlite` connection.
///
/// A transaction begins with the first operation and ends with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback); the next
/// operation begins another. Dropping the session with a transaction open
/// rolls it back and returns the connection to the pool.
pub struct SyncSession {
    pool: SyncPool,
    conn: Option<SyncConnection>,
    closed: bool,
}

impl SyncSession {
    pub(crate) fn new(pool: SyncPool) -> Self {
        Self { pool, conn: None, closed: false }
    }

    pub fn is_active(&self) -> bool {
        !self.closed
    }

    pub fn in_transaction(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&mut self) -> Result<&SyncConnection, DbError> {
        if self.closed {
            return Err(DbError::SessionClosed);
        }
        if self.conn.is_none() {
            let conn = self.pool.get()?;
            if !conn.is_autocommit() {
                warn!("pooled connection had an open transaction; rolling it back");
                conn.execute_batch("ROLLBACK")?;
            }
            conn.execute_batch("BEGIN")?;
            debug!("session transaction started");
            self.conn = Some(conn);
        }
        self.conn.as_ref().ok_or(DbError::SessionClosed)
    }

    pub fn insert<M: Model>(&mut self, model: &mut M) -> Result<(), DbError> {
        model.before_insert(now());
        let statement = insert_statement(model)?;
        self.run(&statement)?;
        Ok(())
    }

    /// Writes the updatable columns of an existing row.
    pub fn update<M: Model>(&mut self, model: &mut M) -> Result<(), DbError> {
        model.before_update(now());
        let statement = update_statement(model)?;
        match self.run(&statement)? {
            0 => Err(DbError::NotFound { table: M::TABLE }),
            _ => Ok(()),
        }
    }

    pub fn all<M: Model>(&mut self) -> Result<Vec<M>, DbError> {
        self.fetch(select_statement::<M>(None)?)
    }

    pub fn find<M: Model>(&mut self, key: impl Into<Value>) -> Result<Option<M>, DbError> {
        let mut statement = select_by_key_statement::<M>(key.into())?;
        statement.sql.push_str(" LIMIT 1");
        Ok(self.fetch(statement)?.into_iter().next())
    }

    /// Rows whose `column` equals `value`. `column` must be one of `M`'s.
    pub fn filter_by<M: Model>(
        &mut self,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<M>, DbError> {
        self.fetch(select_statement::<M>(Some((column, value.into())))?)
    }

    pub fn first_by<M: Model>(
        &mut self,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Option<M>, DbError> {
        let mut statement = select_statement::<M>(Some((column, value.into())))?;
        statement.sql.push_str(" LIMIT 1");
        Ok(self.fetch(statement)?.into_iter().next())
    }

    /// Reloads `model` from its stored row.
    pub fn refresh<M: Model>(&mut self, model: &mut M) -> Result<(), DbError> {
        let stored = self
            .find::<M>(model.primary_key())?
            .ok_or(DbError::NotFound { table: M::TABLE })?;
        *model = stored;
        Ok(())
    }

    /// Runs a raw statement and returns the number of affected rows.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let conn = self.connection()?;
        let affected = conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let conn = self.connection()?;
        let mut statement = conn.prepare(sql)?;
        let rows = statement
            .query_map(params_from_iter(params.iter()), row_from_rusqlite)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn table_names(&mut self) -> Result<Vec<String>, DbError> {
        self.query(TABLE_NAMES_SQL, &[])?.iter().map(|row| row.get_string("name")).collect()
    }

    /// Column names of `table` in declaration order; empty if the table
    /// does not exist.
    pub fn column_names(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        self.query(COLUMN_NAMES_SQL, &[Value::from(table)])?
            .iter()
            .map(|row| row.get_string("name"))
            .collect()
    }

    /// Commits the open transaction, if any. A failed commit is rolled back.
    pub fn commit(&mut self) -> Result<(), DbError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if let Err(error) = conn.execute_batch("COMMIT") {
            if !conn.is_autocommit() {
                if let Err(rollback_error) = conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback_error, "rollback after failed commit also failed");
                }
            }
            return Err(error.into());
        }
        debug!("session transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), DbError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.execute_batch("ROLLBACK")?;
        debug!("session transaction rolled back");
        Ok(())
    }

    /// Rolls back any open transaction and releases the connection. Later
    /// operations fail with [`DbError::SessionClosed`].
    pub fn close(&mut self) -> Result<(), DbError> {
        let result = self.rollback();
        self.closed = true;
        result
    }

    fn run(&mut self, statement: &Statement) -> Result<u64, DbError> {
        self.execute(&statement.sql, &statement.params)
    }

    fn fetch<M: Model>(&mut self, statement: Statement) -> Result<Vec<M>, DbError> {
        self.query(&statement.sql, &statement.params)?.iter().map(M::from_row).collect()
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            match conn.execute_batch("ROLLBACK") {
                Ok(()) => debug!("open transaction rolled back on drop"),
                Err(error) => warn!(%error, "failed to roll back transaction on drop"),
            }
        }
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("active", &self.is_active())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
