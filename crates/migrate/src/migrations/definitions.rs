//! Migration Definitions - Core types for the migration system
//!
//! Defines the `Migration` unit of work, history records and the status and
//! outcome types returned by the migrator.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::executor::Executor;

/// A named, reversible schema change
///
/// Names must sort into the intended execution order; a leading timestamp such
/// as `20240101120000_create_users` is the usual convention.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique migration name
    fn name(&self) -> &str;

    /// Apply the change
    async fn up(&self, schema: &mut Executor<'_>) -> anyhow::Result<()>;

    /// Revert the change
    async fn down(&self, schema: &mut Executor<'_>) -> anyhow::Result<()>;
}

/// A row of the history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: i64,
    /// Migration name
    pub migration: String,
    /// Batch number (for grouping migrations)
    pub batch: i32,
    /// When the migration was applied
    pub executed_at: Option<DateTime<Utc>>,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Roll back the migration
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Migration status relative to the history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    /// Registered, not yet applied
    Pending,
    /// Registered and recorded in history
    Applied {
        /// Batch number
        batch: i32,
        /// When it was applied
        executed_at: Option<DateTime<Utc>>,
    },
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, MigrationStatus::Applied { .. })
    }
}

/// Status line for one registered migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    pub status: MigrationStatus,
}

/// Result of a successful refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Migrations reverted by the reset, in rollback order
    pub rolled_back: Vec<String>,
    /// Migrations applied afterwards, in execution order
    pub executed: Vec<String>,
}
