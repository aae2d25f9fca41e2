//! Core Backend Traits
//!
//! The capability surface the migration engine consumes from a database
//! driver: a shared connection, a transaction that is committed or rolled back
//! exactly once, rows and parameter values.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::BackendType;
use crate::config::ConnectionConfig;
use crate::error::MigrateResult;
use crate::grammar::Grammar;

/// A live database connection (usually pool-backed)
#[async_trait]
pub trait Connection: Send + Sync {
    /// Backend identifier, matching the grammar name (`postgres`, `mysql`, `sqlite`)
    fn backend_name(&self) -> &str;

    /// Whether this connection talks to the named backend; aliases such as
    /// `postgresql` and `sqlite3` match their canonical names
    fn is(&self, name: &str) -> bool {
        match (self.backend_name().parse::<BackendType>(), name.parse::<BackendType>()) {
            (Ok(ours), Ok(theirs)) => ours == theirs,
            _ => self.backend_name().eq_ignore_ascii_case(name),
        }
    }

    /// Dialect compiler for this connection
    fn grammar(&self) -> &dyn Grammar;

    /// Execute a statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    /// Execute a query and return all rows
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>>;

    /// Open a transaction
    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>>;
}

/// An open transaction
///
/// `commit` and `rollback` consume the transaction, so each can happen at most
/// once and never both. `Sync` lets a migration body await executor reads
/// while the executor borrows the transaction.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a statement inside the transaction
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64>;

    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    async fn rollback(self: Box<Self>) -> MigrateResult<()>;
}

/// A single result row
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue>;

    /// Number of columns in the row
    fn column_count(&self) -> usize;
}

/// Constructor for connections of one backend
#[async_trait]
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn grammar(&self) -> Box<dyn Grammar>;

    async fn connect(&self, config: &ConnectionConfig) -> MigrateResult<Arc<dyn Connection>>;
}

/// Parameter and result values
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl DatabaseValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Integer view of the value; numeric strings are accepted since some
    /// drivers report aggregates as text
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DatabaseValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}
