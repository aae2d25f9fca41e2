//! # elif-migrate: Schema migrations for elif.rs
//!
//! Describe tables once with the dialect-neutral [`schema::Table`] builder,
//! compile them to PostgreSQL, MySQL or SQLite DDL through a [`grammar::Grammar`],
//! and apply or revert named migrations in batches with [`Migrator`].
//!
//! Backends with transactional DDL (PostgreSQL, SQLite) run each migration and
//! its history write in one transaction. MySQL falls back to running them
//! directly, so a failure there can leave a migration half applied.
//!
//! The in-memory `testing::RecordingConnection` is only compiled for this
//! crate's own tests or with the `testing` feature.

pub mod backends;
pub mod config;
pub mod error;
pub mod grammar;
pub mod migrations;
pub mod schema;
pub mod security;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export core traits and types
pub use backends::{
    supports_transactional_ddl, BackendType, Connection, DatabaseRow, DatabaseValue, Driver,
    DriverRegistry, Transaction,
};
pub use config::{ConnectionConfig, MigrationConfig, DEFAULT_MIGRATIONS_TABLE};
pub use error::{MigrateError, MigrateResult, RefreshError, RunError};
pub use grammar::{grammar_for, Grammar, MySqlGrammar, PostgresGrammar, SqliteGrammar};
pub use migrations::{
    Executor, Migration, MigrationDirection, MigrationRecord, MigrationRollback, MigrationStatus,
    MigrationStatusEntry, Migrator, RefreshOutcome,
};
pub use schema::{Column, ColumnType, DefaultValue, ForeignKey, ForeignKeyAction, Index, IndexKind, Table};
