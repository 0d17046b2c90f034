// Driver-neutral values and rows.
//
// Both drivers bind and read through `Value`, so a row written by a blocking
// session reads back identically from an async one. Rich types are encoded
// to SQLite storage classes here and nowhere else.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use uuid::Uuid;

use crate::error::DbError;

/// Storage format for timestamps: microsecond RFC 3339 in UTC, which sorts
/// lexically in time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Real(_) => "REAL",
            Self::Text(_) => "TEXT",
            Self::Blob(_) => "BLOB",
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Text(value.hyphenated().to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Text(encode_timestamp(&value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

pub fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses the storage format, any RFC 3339 timestamp, or SQLite's own
/// `datetime('now')` output (assumed UTC).
pub fn decode_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// One result row, addressed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Result<&Value, DbError> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|index| &self.values[index])
            .ok_or_else(|| DbError::MissingColumn(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, DbError> {
        match self.get(column)? {
            Value::Integer(value) => Ok(*value),
            other => Err(decode_error(column, "an integer", other)),
        }
    }

    pub fn get_f64(&self, column: &str) -> Result<f64, DbError> {
        match self.get(column)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            other => Err(decode_error(column, "a real", other)),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, DbError> {
        match self.get(column)? {
            Value::Integer(value) => Ok(*value != 0),
            other => Err(decode_error(column, "a boolean", other)),
        }
    }

    pub fn get_string(&self, column: &str) -> Result<String, DbError> {
        match self.get(column)? {
            Value::Text(value) => Ok(value.clone()),
            other => Err(decode_error(column, "text", other)),
        }
    }

    pub fn get_opt_string(&self, column: &str) -> Result<Option<String>, DbError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            _ => self.get_string(column).map(Some),
        }
    }

    pub fn get_blob(&self, column: &str) -> Result<Vec<u8>, DbError> {
        match self.get(column)? {
            Value::Blob(value) => Ok(value.clone()),
            other => Err(decode_error(column, "a blob", other)),
        }
    }

    pub fn get_uuid(&self, column: &str) -> Result<Uuid, DbError> {
        match self.get(column)? {
            Value::Text(text) => Uuid::parse_str(text).map_err(|_| DbError::Decode {
                column: column.to_string(),
                expected: "a uuid",
                found: format!("text `{text}`"),
            }),
            Value::Blob(bytes) => Uuid::from_slice(bytes).map_err(|_| DbError::Decode {
                column: column.to_string(),
                expected: "a uuid",
                found: format!("a {}-byte blob", bytes.len()),
            }),
            other => Err(decode_error(column, "a uuid", other)),
        }
    }

    pub fn get_timestamp(&self, column: &str) -> Result<DateTime<Utc>, DbError> {
        match self.get(column)? {
            Value::Text(text) => decode_timestamp(text).ok_or_else(|| DbError::Decode {
                column: column.to_string(),
                expected: "a timestamp",
                found: format!("text `{text}`"),
            }),
            other => Err(decode_error(column, "a timestamp", other)),
        }
    }

    pub fn get_opt_timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            _ => self.get_timestamp(column).map(Some),
        }
    }
}

fn decode_error(column: &str, expected: &'static str, found: &Value) -> DbError {
    DbError::Decode { column: column.to_string(), expected, found: found.kind().to_string() }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Integer(value) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Self::Blob(value) => ToSqlOutput::Borrowed(ValueRef::Blob(value)),
        })
    }
}

pub(crate) fn row_from_rusqlite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let statement = row.as_ref();
    let count = statement.column_count();
    let mut columns = Vec::with_capacity(count);
    let mut values = Vec::with_capacity(count);

    for index in 0..count {
        columns.push(statement.column_name(index)?.to_string());
        let value = match row.get_ref(index)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(value) => Value::Integer(value),
            ValueRef::Real(value) => Value::Real(value),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        };
        values.push(value);
    }

    Ok(Row::new(columns, values))
}

pub(crate) fn row_from_sqlx(row: &SqliteRow) -> Result<Row, sqlx::Error> {
    use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};

    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());

        let storage_class = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage_class.as_deref() {
            None => Value::Null,
            Some("INTEGER") | Some("BOOLEAN") => Value::Integer(row.try_get_unchecked(index)?),
            Some("REAL") => Value::Real(row.try_get_unchecked(index)?),
            Some("BLOB") => Value::Blob(row.try_get_unchecked(index)?),
            Some(_) => Value::Text(row.try_get_unchecked(index)?),
        };
        values.push(value);
    }

    Ok(Row::new(columns, values))
}

pub(crate) fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Integer(value) => query.bind(*value),
            Value::Real(value) => query.bind(*value),
            Value::Text(value) => query.bind(value.as_str()),
            Value::Blob(value) => query.bind(value.as_slice()),
        };
    }
    query
}
