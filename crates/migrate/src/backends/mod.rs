//! Database Backend Abstractions
//!
//! Connection and transaction capabilities, the driver registry and the
//! built-in sqlx-backed PostgreSQL driver.

pub mod core;
pub mod postgres;
pub mod registry;

// Re-export core traits and types
pub use self::core::*;
pub use postgres::{PostgresConnection, PostgresDriver, PostgresTransaction};
pub use registry::{DriverFactory, DriverRegistry};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl BackendType {
    pub const ALL: [BackendType; 3] = [BackendType::PostgreSQL, BackendType::MySQL, BackendType::SQLite];

    /// Whether DDL statements participate in transactions on this backend
    ///
    /// MySQL commits implicitly around DDL, so a failed migration there cannot
    /// be rolled back.
    pub fn supports_transactional_ddl(&self) -> bool {
        match self {
            BackendType::PostgreSQL | BackendType::SQLite => true,
            BackendType::MySQL => false,
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::PostgreSQL => write!(f, "postgres"),
            BackendType::MySQL => write!(f, "mysql"),
            BackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(BackendType::PostgreSQL),
            "mysql" => Ok(BackendType::MySQL),
            "sqlite" | "sqlite3" => Ok(BackendType::SQLite),
            _ => Err(format!("Unsupported database backend: {}", s)),
        }
    }
}

/// Name-based transactional DDL lookup; unknown backends are treated as
/// non-transactional
pub fn supports_transactional_ddl(name: &str) -> bool {
    name.parse::<BackendType>()
        .map(|backend| backend.supports_transactional_ddl())
        .unwrap_or(false)
}
