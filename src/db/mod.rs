mod sqlite;

pub use sqlite::SqliteStore;

use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use std::collections::BTreeMap;

/// A positional query parameter or a column value read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            Self::Real(value) => ToSqlOutput::Borrowed(ValueRef::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(value) => Self::Integer(value),
            ValueRef::Real(value) => Self::Real(value),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Self::Text(String::from_utf8_lossy(bytes).to_string())
            }
        }
    }
}

/// One result row, keyed by column alias. Typed record shapes are decoded from it via
/// the accessors below, so a missing or mistyped column surfaces as a `DataAccess` error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<SqlValue>) {
        self.columns.insert(column.to_string(), value.into());
    }

    fn value(&self, column: &str) -> AppResult<&SqlValue> {
        self.columns
            .get(column)
            .ok_or_else(|| AppError::DataAccess(format!("result row is missing column '{}'", column)))
    }

    pub fn text(&self, column: &str) -> AppResult<String> {
        self.opt_text(column)?
            .ok_or_else(|| AppError::DataAccess(format!("column '{}' is null", column)))
    }

    pub fn opt_text(&self, column: &str) -> AppResult<Option<String>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(value) => Ok(Some(value.clone())),
            SqlValue::Integer(value) => Ok(Some(value.to_string())),
            SqlValue::Real(value) => Ok(Some(value.to_string())),
        }
    }

    pub fn int(&self, column: &str) -> AppResult<i64> {
        self.opt_int(column)?
            .ok_or_else(|| AppError::DataAccess(format!("column '{}' is null", column)))
    }

    pub fn opt_int(&self, column: &str) -> AppResult<Option<i64>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(value) => Ok(Some(*value)),
            SqlValue::Real(value) => Ok(Some(*value as i64)),
            SqlValue::Text(value) => value
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| AppError::DataAccess(format!("column '{}' is not an integer", column))),
        }
    }

    pub fn opt_real(&self, column: &str) -> AppResult<Option<f64>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(value) => Ok(Some(*value as f64)),
            SqlValue::Real(value) => Ok(Some(*value)),
            SqlValue::Text(value) => value
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| AppError::DataAccess(format!("column '{}' is not numeric", column))),
        }
    }

    /// Null reads as `false`.
    pub fn flag(&self, column: &str) -> AppResult<bool> {
        Ok(self.opt_int(column)?.unwrap_or(0) != 0)
    }
}

/// The relational store consumed by the engine. Implementations must be safe to share
/// between concurrent calls; every method is a suspension point.
#[async_trait]
pub trait DataStore: Send + Sync {
    fn is_initialized(&self) -> bool;

    async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> AppResult<Option<Row>>;

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>>;

    /// Returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> AppResult<u64>;

    /// Runs `statements` in order inside one transaction and returns each affected-row
    /// count. `None` means a `required` statement changed nothing and the whole batch
    /// was rolled back.
    async fn execute_in_transaction(&self, statements: Vec<Statement>) -> AppResult<Option<Vec<u64>>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub required: bool,
}

impl Statement {
    pub fn new(sql: &str, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.to_string(),
            params,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Fails fast with `ServiceUnavailable` instead of issuing queries against a store
/// that is not ready.
pub fn ensure_ready(store: &dyn DataStore) -> AppResult<()> {
    if store.is_initialized() {
        Ok(())
    } else {
        Err(AppError::ServiceUnavailable(
            "Database service is not available. Please try again later.".to_string(),
        ))
    }
}
