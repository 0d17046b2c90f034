//! Reusable entity fields with persistence hooks.
//!
//! A model embeds the mixins it wants as fields and forwards
//! [`Model::columns`](crate::Model::columns), `to_values`, `from_row` and the
//! two hooks to them:
//!
//! ```ignore
//! struct Post {
//!     ident: Identifier,
//!     created: CreatedAt,
//!     updated: UpdatedAt,
//!     title: String,
//! }
//!
//! impl Model for Post {
//!     const TABLE: &'static str = "posts";
//!
//!     fn columns() -> Vec<Column> {
//!         let mut columns = Identifier::columns();
//!         columns.extend(CreatedAt::columns());
//!         columns.extend(UpdatedAt::columns());
//!         columns.push(Column::new("title", SqlType::Text));
//!         columns
//!     }
//!
//!     fn before_insert(&mut self, now: DateTime<Utc>) {
//!         self.ident.before_insert(now);
//!         self.created.before_insert(now);
//!         self.updated.before_insert(now);
//!     }
//!     // ...
//! }
//! ```

use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use crate::error::DbError;
use crate::model::{Column, SqlType};
use crate::value::{Row, Value};

/// Current time at storage precision (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub trait Mixin: Sized {
    fn columns() -> Vec<Column>;

    fn write_values(&self, out: &mut Vec<Value>);

    fn read(row: &Row) -> Result<Self, DbError>;

    fn before_insert(&mut self, _now: DateTime<Utc>) {}

    fn before_update(&mut self, _now: DateTime<Utc>) {}
}

/// UUIDv7 primary key, generated client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    pub id: Uuid,
}

impl Identifier {
    pub fn new() -> Self {
        Self { id: Uuid::now_v7() }
    }

    /// An identifier left for the insert hook to fill in.
    pub fn unassigned() -> Self {
        Self { id: Uuid::nil() }
    }

    pub fn value(&self) -> Value {
        self.id.into()
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixin for Identifier {
    fn columns() -> Vec<Column> {
        vec![Column::new("id", SqlType::Uuid).primary_key()]
    }

    fn write_values(&self, out: &mut Vec<Value>) {
        out.push(self.value());
    }

    fn read(row: &Row) -> Result<Self, DbError> {
        Ok(Self { id: row.get_uuid("id")? })
    }

    fn before_insert(&mut self, _now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::now_v7();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedAt {
    pub created_at: DateTime<Utc>,
}

impl Default for CreatedAt {
    fn default() -> Self {
        Self { created_at: now() }
    }
}

impl Mixin for CreatedAt {
    fn columns() -> Vec<Column> {
        vec![Column::new("created_at", SqlType::Timestamp).insert_only()]
    }

    fn write_values(&self, out: &mut Vec<Value>) {
        out.push(self.created_at.into());
    }

    fn read(row: &Row) -> Result<Self, DbError> {
        Ok(Self { created_at: row.get_timestamp("created_at")? })
    }

    fn before_insert(&mut self, now: DateTime<Utc>) {
        self.created_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatedAt {
    pub updated_at: DateTime<Utc>,
}

impl Default for UpdatedAt {
    fn default() -> Self {
        Self { updated_at: now() }
    }
}

impl Mixin for UpdatedAt {
    fn columns() -> Vec<Column> {
        vec![Column::new("updated_at", SqlType::Timestamp)]
    }

    fn write_values(&self, out: &mut Vec<Value>) {
        out.push(self.updated_at.into());
    }

    fn read(row: &Row) -> Result<Self, DbError> {
        Ok(Self { updated_at: row.get_timestamp("updated_at")? })
    }

    fn before_insert(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn before_update(&mut self, now: DateTime<Utc>) {
        self.updated_at = advance(self.updated_at, now);
    }
}

/// `now`, or one microsecond past `previous` when the clock has not moved
/// on (or moved backwards).
pub fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Soft-delete marker. `deleted_at` is set iff `deleted` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftDelete {
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDelete {
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn restore(&mut self) {
        self.deleted = false;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn sync_deleted_at(&mut self, now: DateTime<Utc>) {
        match (self.deleted, self.deleted_at) {
            (true, None) => self.deleted_at = Some(now),
            (false, Some(_)) => self.deleted_at = None,
            _ => {}
        }
    }
}

impl Mixin for SoftDelete {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("deleted", SqlType::Boolean),
            Column::new("deleted_at", SqlType::Timestamp).nullable(),
        ]
    }

    fn write_values(&self, out: &mut Vec<Value>) {
        out.push(self.deleted.into());
        out.push(self.deleted_at.into());
    }

    fn read(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            deleted: row.get_bool("deleted")?,
            deleted_at: row.get_opt_timestamp("deleted_at")?,
        })
    }

    fn before_insert(&mut self, now: DateTime<Utc>) {
        self.sync_deleted_at(now);
    }

    fn before_update(&mut self, now: DateTime<Utc>) {
        self.sync_deleted_at(now);
    }
}
