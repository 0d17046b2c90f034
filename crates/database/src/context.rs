// Scoped sessions: commit on success, roll back on error, always release.

use futures_util::future::BoxFuture;
use tracing::warn;

use crate::database::Database;
use crate::error::DbError;
use crate::session::{AsyncSession, SyncSession};

/// Runs `f` inside a blocking session.
///
/// Commits when `f` returns `Ok`. When it returns `Err`, the transaction is
/// rolled back and the error is returned unchanged. A panic inside `f`
/// unwinds through the session's drop, which also rolls back.
///
/// ```no_run
/// # use strata_database::{db_session_sync, Database, DbError};
/// # fn demo(db: &Database) -> Result<(), DbError> {
/// let count = db_session_sync(db, |session| {
///     session.execute("UPDATE jobs SET state = 'done' WHERE state = 'running'", &[])
/// })?;
/// # Ok(())
/// # }
/// ```
pub fn db_session_sync<T, E, F>(db: &Database, f: F) -> Result<T, E>
where
    F: FnOnce(&mut SyncSession) -> Result<T, E>,
    E: From<DbError>,
{
    let mut session = db.sync_session()?;
    match f(&mut session) {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = session.rollback() {
                warn!(error = %rollback_error, "rollback after failed session scope failed");
            }
            Err(error)
        }
    }
}

/// Async counterpart of [`db_session_sync`].
///
/// The closure returns a boxed future borrowing the session:
///
/// ```no_run
/// # use strata_database::{db_session_async, Database, DbError};
/// # async fn demo(db: &Database) -> Result<(), DbError> {
/// let tables = db_session_async(db, |session| {
///     Box::pin(async move { session.table_names().await })
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// Dropping the returned future before it completes drops the session's
/// transaction, which rolls it back.
pub async fn db_session_async<T, E, F>(db: &Database, f: F) -> Result<T, E>
where
    F: for<'s> FnOnce(&'s mut AsyncSession) -> BoxFuture<'s, Result<T, E>>,
    E: From<DbError>,
{
    let mut session = db.async_session().await?;
    let outcome = f(&mut session).await;
    match outcome {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = session.rollback().await {
                warn!(error = %rollback_error, "rollback after failed session scope failed");
            }
            Err(error)
        }
    }
}
