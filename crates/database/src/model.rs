// Persisted entities and the handful of statements needed to store them.

use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Uuid,
    Timestamp,
}

impl SqlType {
    /// Declared column type. Uuids and timestamps are stored as text.
    pub const fn ddl(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Uuid | Self::Timestamp => "TEXT",
            Self::Blob => "BLOB",
            Self::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Written by `UPDATE`. Primary keys and insert-only columns are not.
    pub updatable: bool,
}

impl Column {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self { name, sql_type, nullable: false, primary_key: false, updatable: true }
    }

    pub const fn nullable(self) -> Self {
        Self { nullable: true, ..self }
    }

    pub const fn primary_key(self) -> Self {
        Self { primary_key: true, updatable: false, ..self }
    }

    /// Set at insert and never rewritten.
    pub const fn insert_only(self) -> Self {
        Self { updatable: false, ..self }
    }

    pub fn ddl(&self) -> String {
        let mut ddl = format!("{} {}", quote_ident(self.name), self.sql_type.ddl());
        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            ddl.push_str(" NOT NULL");
        }
        ddl
    }
}

/// An entity stored as one row of `TABLE`.
///
/// `to_values` must yield one value per entry of `columns`, in the same
/// order. Mixins contribute their columns, values and hooks; see
/// [`crate::mixins`].
pub trait Model: Sized + Send + Sync {
    const TABLE: &'static str;

    fn columns() -> Vec<Column>;

    fn to_values(&self) -> Vec<Value>;

    fn from_row(row: &Row) -> Result<Self, DbError>;

    fn primary_key(&self) -> Value;

    /// Runs before the entity is first inserted.
    fn before_insert(&mut self, _now: DateTime<Utc>) {}

    /// Runs before every update of an existing row.
    fn before_update(&mut self, _now: DateTime<Utc>) {}

    fn create_table_sql() -> String {
        let columns: Vec<String> = Self::columns().iter().map(Column::ddl).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(Self::TABLE),
            columns.join(",\n    ")
        )
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub(crate) const TABLE_NAMES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

pub(crate) const COLUMN_NAMES_SQL: &str = "SELECT name FROM pragma_table_info(?1) ORDER BY cid";

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn insert_statement<M: Model>(model: &M) -> Result<Statement, DbError> {
    let columns = M::columns();
    let params = model.to_values();
    check_shape::<M>(&columns, &params)?;

    let names: Vec<String> = columns.iter().map(|column| quote_ident(column.name)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|index| format!("?{index}")).collect();

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(M::TABLE),
            names.join(", "),
            placeholders.join(", ")
        ),
        params,
    })
}

pub(crate) fn update_statement<M: Model>(model: &M) -> Result<Statement, DbError> {
    let columns = M::columns();
    let values = model.to_values();
    check_shape::<M>(&columns, &values)?;
    let key = primary_key_column::<M>(&columns)?;

    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (column, value) in columns.iter().zip(values) {
        if column.updatable {
            params.push(value);
            assignments.push(format!("{} = ?{}", quote_ident(column.name), params.len()));
        }
    }
    params.push(model.primary_key());

    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(M::TABLE),
            assignments.join(", "),
            quote_ident(key.name),
            params.len()
        ),
        params,
    })
}

/// `SELECT` of every model column, optionally filtered on one known column.
pub(crate) fn select_statement<M: Model>(
    filter: Option<(&str, Value)>,
) -> Result<Statement, DbError> {
    let columns = M::columns();
    let names: Vec<String> = columns.iter().map(|column| quote_ident(column.name)).collect();
    let mut sql = format!("SELECT {} FROM {}", names.join(", "), quote_ident(M::TABLE));
    let mut params = Vec::new();

    if let Some((name, value)) = filter {
        let column = columns.iter().find(|column| column.name == name).ok_or_else(|| {
            DbError::UnknownColumn { table: M::TABLE, column: name.to_string() }
        })?;
        sql.push_str(&format!(" WHERE {} = ?1", quote_ident(column.name)));
        params.push(value);
    }

    Ok(Statement { sql, params })
}

pub(crate) fn select_by_key_statement<M: Model>(key: Value) -> Result<Statement, DbError> {
    let key_column = primary_key_column::<M>(&M::columns())?;
    select_statement::<M>(Some((key_column.name, key)))
}

fn primary_key_column<M: Model>(columns: &[Column]) -> Result<Column, DbError> {
    columns
        .iter()
        .copied()
        .find(|column| column.primary_key)
        .ok_or(DbError::NoPrimaryKey { table: M::TABLE })
}

fn check_shape<M: Model>(columns: &[Column], values: &[Value]) -> Result<(), DbError> {
    if columns.len() == values.len() {
        Ok(())
    } else {
        Err(DbError::ModelShape { table: M::TABLE, columns: columns.len(), values: values.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Note {
        id: i64,
        body: String,
        pinned_at: Option<String>,
    }

    impl Model for Note {
        const TABLE: &'static str = "notes";

        fn columns() -> Vec<Column> {
            vec![
                Column::new("id", SqlType::Integer).primary_key(),
                Column::new("body", SqlType::Text),
                Column::new("pinned_at", SqlType::Timestamp).nullable(),
            ]
        }

        fn to_values(&self) -> Vec<Value> {
            vec![self.id.into(), self.body.clone().into(), self.pinned_at.clone().into()]
        }

        fn from_row(row: &Row) -> Result<Self, DbError> {
            Ok(Self {
                id: row.get_i64("id")?,
                body: row.get_string("body")?,
                pinned_at: row.get_opt_string("pinned_at")?,
            })
        }

        fn primary_key(&self) -> Value {
            self.id.into()
        }
    }

    fn note() -> Note {
        Note { id: 4, body: "hello".into(), pinned_at: None }
    }

    #[test]
    fn create_table_sql_lists_every_column() {
        assert_eq!(
            Note::create_table_sql(),
            "CREATE TABLE IF NOT EXISTS \"notes\" (\n    \"id\" INTEGER PRIMARY KEY,\n    \
             \"body\" TEXT NOT NULL,\n    \"pinned_at\" TEXT\n)"
        );
    }

    #[test]
    fn insert_binds_all_columns_in_order() {
        let statement = insert_statement(&note()).expect("insert statement");
        assert_eq!(
            statement.sql,
            "INSERT INTO \"notes\" (\"id\", \"body\", \"pinned_at\") VALUES (?1, ?2, ?3)"
        );
        assert_eq!(statement.params, vec![Value::Integer(4), Value::from("hello"), Value::Null]);
    }

    #[test]
    fn update_skips_primary_key_and_filters_on_it() {
        let statement = update_statement(&note()).expect("update statement");
        assert_eq!(
            statement.sql,
            "UPDATE \"notes\" SET \"body\" = ?1, \"pinned_at\" = ?2 WHERE \"id\" = ?3"
        );
        assert_eq!(statement.params.last(), Some(&Value::Integer(4)));
    }

    #[test]
    fn select_rejects_unknown_filter_columns() {
        let error = select_statement::<Note>(Some(("body; DROP TABLE notes", "x".into())))
            .expect_err("unknown column should be rejected");
        assert!(matches!(error, DbError::UnknownColumn { table: "notes", .. }));

        let by_key = select_by_key_statement::<Note>(Value::Integer(4)).expect("by key");
        assert!(by_key.sql.ends_with("WHERE \"id\" = ?1"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
