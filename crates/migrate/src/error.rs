//! Error types for the migration engine
//!
//! Covers connectivity failures, identifier rejection, dialect capability gaps,
//! migration body failures and history bookkeeping failures.

use thiserror::Error;

use crate::migrations::definitions::MigrationDirection;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Failed to open a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Failed to begin, commit or roll back a transaction
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A statement was rejected by the database
    #[error("Database error: {0}")]
    Database(String),

    /// An identifier failed validation before reaching the database
    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// The dialect cannot express the requested ALTER in place
    #[error("{backend} cannot alter table '{table}' in place: unsupported {}", .operations.join(", "))]
    UnsupportedAlter {
        backend: String,
        table: String,
        operations: Vec<String>,
    },

    /// The migration's own up/down body returned an error
    #[error("Migration {name} failed during {direction}{}: {source}", rolled_back_note(.rolled_back))]
    MigrationFailed {
        name: String,
        direction: MigrationDirection,
        rolled_back: bool,
        #[source]
        source: anyhow::Error,
    },

    /// The body succeeded but the history insert/delete failed
    #[error("Failed to {} history record for {name}{}: {source}", history_action(.direction), rolled_back_note(.rolled_back))]
    HistoryWrite {
        name: String,
        direction: MigrationDirection,
        rolled_back: bool,
        #[source]
        source: Box<MigrateError>,
    },

    /// The migration's transaction could not be opened or committed
    #[error("Transaction for migration {name} failed during {direction}: {source}")]
    TransactionFailed {
        name: String,
        direction: MigrationDirection,
        #[source]
        source: Box<MigrateError>,
    },

    /// A history record has no registered migration
    #[error("Migration {0} is recorded in history but not registered")]
    OrphanedHistory(String),

    /// No driver registered under the given name
    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A history row could not be decoded
    #[error("History error: {0}")]
    History(String),
}

fn rolled_back_note(rolled_back: &bool) -> &'static str {
    if *rolled_back {
        " (rolled back)"
    } else {
        ""
    }
}

fn history_action(direction: &MigrationDirection) -> &'static str {
    match direction {
        MigrationDirection::Up => "record",
        MigrationDirection::Down => "delete",
    }
}

impl MigrateError {
    /// Whether the failed unit of work was undone by a transaction rollback
    pub fn was_rolled_back(&self) -> bool {
        match self {
            MigrateError::MigrationFailed { rolled_back, .. }
            | MigrateError::HistoryWrite { rolled_back, .. } => *rolled_back,
            _ => false,
        }
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        MigrateError::Database(err.to_string())
    }
}

/// A batch operation stopped at its first failure.
///
/// `completed` holds the migrations that were applied (or reverted) before the
/// failing one, in execution order.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunError {
    pub completed: Vec<String>,
    #[source]
    pub error: MigrateError,
}

impl RunError {
    pub fn new(completed: Vec<String>, error: MigrateError) -> Self {
        Self { completed, error }
    }
}

impl From<MigrateError> for RunError {
    fn from(error: MigrateError) -> Self {
        Self::new(Vec::new(), error)
    }
}

/// Failure of a refresh (reset followed by up)
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Reset failed; no migration was re-applied
    #[error("Refresh aborted during reset: {0}")]
    Reset(#[source] RunError),

    /// Reset succeeded but re-applying failed
    #[error("Refresh failed while re-applying migrations: {error}")]
    Up {
        rolled_back: Vec<String>,
        #[source]
        error: RunError,
    },
}
