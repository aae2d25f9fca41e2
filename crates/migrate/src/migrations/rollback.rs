//! Migration Rollback - Handles rolling back applied migrations
//!
//! Reverts the last batch or a number of recent migrations, newest first,
//! deleting each history record as its `down` completes.

use async_trait::async_trait;
use tracing::{debug, info};

use super::definitions::{MigrationDirection, MigrationRecord, RefreshOutcome};
use super::runner::Migrator;
use crate::error::{MigrateError, RefreshError, RunError};

/// Extension trait for Migrator to add rollback functionality
#[async_trait]
pub trait MigrationRollback {
    /// Roll back the last batch (`step == 0`) or the `step` most recent migrations
    async fn down(&mut self, step: usize) -> Result<Vec<String>, RunError>;

    /// Roll back every applied migration
    async fn reset(&mut self) -> Result<Vec<String>, RunError>;

    /// Reset, then apply everything again
    async fn refresh(&mut self) -> Result<RefreshOutcome, RefreshError>;
}

#[async_trait]
impl MigrationRollback for Migrator {
    async fn down(&mut self, step: usize) -> Result<Vec<String>, RunError> {
        self.history().ensure_table().await?;

        let records = self.history().records().await?;
        if records.is_empty() {
            debug!("Nothing to roll back");
            return Ok(Vec::new());
        }

        let targets = select_for_rollback(records, step);
        info!("Rolling back {} migration(s)", targets.len());

        let mut rolled_back = Vec::with_capacity(targets.len());
        for record in targets {
            let migration = match self.find_migration(&record.migration) {
                Some(migration) => migration,
                None => {
                    return Err(RunError::new(
                        rolled_back,
                        MigrateError::OrphanedHistory(record.migration),
                    ))
                }
            };

            info!("Rolling back: {}", record.migration);
            if let Err(error) = self
                .execute(migration.as_ref(), MigrationDirection::Down, record.batch)
                .await
            {
                return Err(RunError::new(rolled_back, error));
            }

            info!("Rolled back: {}", record.migration);
            rolled_back.push(record.migration);
        }

        Ok(rolled_back)
    }

    async fn reset(&mut self) -> Result<Vec<String>, RunError> {
        self.history().ensure_table().await?;

        let applied = self.history().records().await?.len();
        if applied == 0 {
            return Ok(Vec::new());
        }
        self.down(applied).await
    }

    async fn refresh(&mut self) -> Result<RefreshOutcome, RefreshError> {
        let rolled_back = self.reset().await.map_err(RefreshError::Reset)?;

        match self.up(0).await {
            Ok(executed) => Ok(RefreshOutcome {
                rolled_back,
                executed,
            }),
            Err(error) => Err(RefreshError::Up { rolled_back, error }),
        }
    }
}

/// Pick the records to revert and order them newest name first
///
/// `records` arrive ordered by batch then name.
fn select_for_rollback(records: Vec<MigrationRecord>, step: usize) -> Vec<MigrationRecord> {
    let mut targets: Vec<MigrationRecord> = if step > 0 {
        records.into_iter().rev().take(step).collect()
    } else {
        let last_batch = records.iter().map(|r| r.batch).max().unwrap_or(0);
        records.into_iter().filter(|r| r.batch == last_batch).collect()
    };
    targets.sort_by(|a, b| b.migration.cmp(&a.migration));
    targets
}
