//! Session scopes, model mixins and environment-driven wiring over SQLite.
//!
//! Blocking code goes through [`SyncSession`] (rusqlite over an r2d2 pool),
//! async code through [`AsyncSession`] (sqlx). Both read and write the same
//! rows through the driver-neutral [`Value`] encoding.

mod config;
mod context;
mod database;
mod error;
mod inject;
mod migrations;
pub mod mixins;
mod model;
mod pool;
mod session;
mod value;

pub use config::{ConfigError, DatabaseConfig, DatabaseType, DATABASE_TYPE_VAR};
pub use context::{db_session_async, db_session_sync};
pub use database::Database;
pub use error::DbError;
pub use migrations::Migration;
pub use mixins::{CreatedAt, Identifier, Mixin, SoftDelete, UpdatedAt};
pub use model::{quote_ident, Column, Model, SqlType};
pub use pool::{PoolConfig, SyncConnection, SyncPool};
pub use session::{AsyncSession, SyncSession};
pub use value::{decode_timestamp, encode_timestamp, Row, Value, TIMESTAMP_FORMAT};

pub use futures_util::future::BoxFuture;
