//! Migration Runner - Executes migrations against the database
//!
//! Orders pending migrations by name, groups each `up` call into one batch and
//! wraps every migration in its own transaction on backends with
//! transactional DDL. Rolling back lives in [`super::rollback`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::definitions::{Migration, MigrationDirection, MigrationRecord, MigrationStatus, MigrationStatusEntry};
use super::executor::Executor;
use super::history::MigrationHistory;
use crate::backends::{BackendType, Connection, Transaction};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, MigrateResult, RunError};

/// Runs registered migrations against one connection
pub struct Migrator {
    connection: Arc<dyn Connection>,
    history: MigrationHistory,
    migrations: Vec<Arc<dyn Migration>>,
    dry_run: bool,
    dry_run_sql: Vec<String>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("backend", &self.connection.backend_name())
            .field("table", &self.history.table())
            .field("migrations", &self.migration_names())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Migrator {
    /// Create a migrator; fails if the history table name is not a safe identifier
    pub fn new(connection: Arc<dyn Connection>, config: MigrationConfig) -> MigrateResult<Self> {
        config.validate()?;
        let history = MigrationHistory::new(Arc::clone(&connection), &config.table);
        Ok(Self {
            connection,
            history,
            migrations: Vec::new(),
            dry_run: config.dry_run,
            dry_run_sql: Vec::new(),
        })
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn history(&self) -> &MigrationHistory {
        &self.history
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// SQL recorded by dry-run executions, in order
    pub fn dry_run_sql(&self) -> &[String] {
        &self.dry_run_sql
    }

    /// Drain the recorded dry-run SQL
    pub fn take_dry_run_sql(&mut self) -> Vec<String> {
        std::mem::take(&mut self.dry_run_sql)
    }

    /// Register a migration
    pub fn register<M>(&mut self, migration: M)
    where
        M: Migration + 'static,
    {
        self.migrations.push(Arc::new(migration));
    }

    /// Register several migrations at once
    pub fn register_all<I>(&mut self, migrations: I)
    where
        I: IntoIterator<Item = Arc<dyn Migration>>,
    {
        self.migrations.extend(migrations);
    }

    /// Registered names, in registration order
    pub fn migration_names(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    pub(crate) fn find_migration(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.iter().find(|m| m.name() == name).cloned()
    }

    /// Whether migrations run inside a transaction on this backend
    pub fn uses_transactions(&self) -> bool {
        !self.dry_run
            && BackendType::ALL
                .iter()
                .filter(|backend| backend.supports_transactional_ddl())
                .any(|backend| self.connection.is(&backend.to_string()))
    }

    /// Apply pending migrations in name order
    ///
    /// `step > 0` limits the run to the first `step` pending migrations. All
    /// migrations applied by one call share a batch number. Stops at the
    /// first failure; the error carries the names applied before it.
    pub async fn up(&mut self, step: usize) -> Result<Vec<String>, RunError> {
        self.history.ensure_table().await?;

        let applied: HashMap<String, MigrationRecord> = self
            .history
            .records()
            .await?
            .into_iter()
            .map(|record| (record.migration.clone(), record))
            .collect();

        let mut pending: Vec<Arc<dyn Migration>> = self
            .migrations
            .iter()
            .filter(|m| !applied.contains_key(m.name()))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.name().cmp(b.name()));

        if step > 0 {
            pending.truncate(step);
        }

        if pending.is_empty() {
            debug!("Nothing to migrate");
            return Ok(Vec::new());
        }

        let batch = self.history.last_batch().await? + 1;
        info!("Running {} migration(s) in batch {}", pending.len(), batch);

        let mut executed = Vec::with_capacity(pending.len());
        for migration in pending {
            let name = migration.name().to_string();
            info!("Migrating: {}", name);

            if let Err(error) = self.execute(migration.as_ref(), MigrationDirection::Up, batch).await {
                return Err(RunError::new(executed, error));
            }

            info!("Migrated: {}", name);
            executed.push(name);
        }

        Ok(executed)
    }

    /// Status of every registered migration, sorted by name
    pub async fn status(&self) -> MigrateResult<Vec<MigrationStatusEntry>> {
        self.history.ensure_table().await?;

        let applied: HashMap<String, MigrationRecord> = self
            .history
            .records()
            .await?
            .into_iter()
            .map(|record| (record.migration.clone(), record))
            .collect();

        let mut entries: Vec<MigrationStatusEntry> = self
            .migrations
            .iter()
            .map(|migration| {
                let status = match applied.get(migration.name()) {
                    Some(record) => MigrationStatus::Applied {
                        batch: record.batch,
                        executed_at: record.executed_at,
                    },
                    None => MigrationStatus::Pending,
                };
                MigrationStatusEntry {
                    name: migration.name().to_string(),
                    status,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(entries)
    }

    /// Run one migration in `direction` and write or remove its history record
    pub(crate) async fn execute(
        &mut self,
        migration: &dyn Migration,
        direction: MigrationDirection,
        batch: i32,
    ) -> MigrateResult<()> {
        if self.uses_transactions() {
            self.execute_in_transaction(migration, direction, batch).await
        } else {
            self.execute_direct(migration, direction, batch).await
        }
    }

    async fn execute_in_transaction(
        &self,
        migration: &dyn Migration,
        direction: MigrationDirection,
        batch: i32,
    ) -> MigrateResult<()> {
        let name = migration.name();
        let failed = |source: MigrateError| MigrateError::TransactionFailed {
            name: name.to_string(),
            direction,
            source: Box::new(source),
        };
        let mut tx = self.connection.begin().await.map_err(failed)?;

        let body = {
            let mut schema = Executor::with_transaction(self.connection.as_ref(), tx.as_mut());
            run_body(migration, &mut schema, direction).await
        };

        if let Err(source) = body {
            let rolled_back = rollback(tx, name).await;
            return Err(MigrateError::MigrationFailed {
                name: name.to_string(),
                direction,
                rolled_back,
                source,
            });
        }

        let write = match direction {
            MigrationDirection::Up => self.history.record_in(tx.as_mut(), name, batch).await,
            MigrationDirection::Down => self.history.delete_in(tx.as_mut(), name).await,
        };

        if let Err(error) = write {
            let rolled_back = rollback(tx, name).await;
            return Err(MigrateError::HistoryWrite {
                name: name.to_string(),
                direction,
                rolled_back,
                source: Box::new(error),
            });
        }

        tx.commit().await.map_err(failed)
    }

    /// Without transactional DDL, statements that ran before a failure stay applied
    async fn execute_direct(
        &mut self,
        migration: &dyn Migration,
        direction: MigrationDirection,
        batch: i32,
    ) -> MigrateResult<()> {
        let name = migration.name();
        let connection = Arc::clone(&self.connection);

        let body = {
            let mut schema = if self.dry_run {
                Executor::dry_run(connection.as_ref())
            } else {
                Executor::new(connection.as_ref())
            };
            let body = run_body(migration, &mut schema, direction).await;
            self.dry_run_sql.extend(schema.into_statements());
            body
        };

        if let Err(source) = body {
            if !self.dry_run {
                warn!(
                    "Migration {} failed during {} without transactional DDL; applied statements were not undone",
                    name, direction
                );
            }
            return Err(MigrateError::MigrationFailed {
                name: name.to_string(),
                direction,
                rolled_back: false,
                source,
            });
        }

        if self.dry_run {
            return Ok(());
        }

        let write = match direction {
            MigrationDirection::Up => self.history.record(name, batch).await,
            MigrationDirection::Down => self.history.delete(name).await,
        };

        write.map_err(|error| {
            warn!(
                "Migration {} completed {} but its history record could not be updated",
                name, direction
            );
            MigrateError::HistoryWrite {
                name: name.to_string(),
                direction,
                rolled_back: false,
                source: Box::new(error),
            }
        })
    }
}

async fn run_body(
    migration: &dyn Migration,
    schema: &mut Executor<'_>,
    direction: MigrationDirection,
) -> anyhow::Result<()> {
    match direction {
        MigrationDirection::Up => migration.up(schema).await,
        MigrationDirection::Down => migration.down(schema).await,
    }
}

/// Roll back and report whether it worked
async fn rollback(tx: Box<dyn Transaction>, name: &str) -> bool {
    match tx.rollback().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Rollback of migration {} failed: {}", name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;
    use async_trait::async_trait;

    struct CreateTable(&'static str, &'static str);

    #[async_trait]
    impl Migration for CreateTable {
        fn name(&self) -> &str {
            self.0
        }

        async fn up(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
            schema
                .create_table(self.1, |t| {
                    t.id();
                })
                .await?;
            Ok(())
        }

        async fn down(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
            schema.drop_table(self.1).await?;
            Ok(())
        }
    }

    #[test]
    fn test_rejects_unsafe_history_table() {
        let conn = Arc::new(RecordingConnection::new("postgres"));
        let err = Migrator::new(conn, MigrationConfig::new("migrations; --")).unwrap_err();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }

    #[test]
    fn test_transaction_selection() {
        let config = MigrationConfig::default();
        let postgres = Migrator::new(Arc::new(RecordingConnection::new("postgres")), config.clone()).unwrap();
        let sqlite = Migrator::new(Arc::new(RecordingConnection::new("sqlite")), config.clone()).unwrap();
        let mysql = Migrator::new(Arc::new(RecordingConnection::new("mysql")), config.clone()).unwrap();
        let dry = Migrator::new(
            Arc::new(RecordingConnection::new("postgres")),
            config.with_dry_run(true),
        )
        .unwrap();

        assert!(postgres.uses_transactions());
        assert!(sqlite.uses_transactions());
        assert!(!mysql.uses_transactions());
        assert!(!dry.uses_transactions());
    }

    #[test]
    fn test_transaction_selection_follows_aliases() {
        let config = MigrationConfig::default();
        let postgresql = Migrator::new(Arc::new(RecordingConnection::new("postgresql")), config.clone()).unwrap();
        let sqlite3 = Migrator::new(Arc::new(RecordingConnection::new("SQLite3")), config).unwrap();

        assert!(postgresql.uses_transactions());
        assert!(sqlite3.uses_transactions());
    }

    #[tokio::test]
    async fn test_up_registers_history_once() {
        let conn = RecordingConnection::new("sqlite");
        let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
        migrator.register(CreateTable("002_posts", "posts"));
        migrator.register(CreateTable("001_users", "users"));

        let executed = migrator.up(0).await.unwrap();
        assert_eq!(executed, vec!["001_users", "002_posts"]);
        assert!(conn.has_table("users"));
        assert!(conn.has_table("posts"));
        assert_eq!(conn.commit_count(), 2);

        assert!(migrator.up(0).await.unwrap().is_empty());
        assert_eq!(conn.history().len(), 2);
    }

    #[tokio::test]
    async fn test_status_sorted_by_name() {
        let conn = RecordingConnection::new("postgres");
        conn.seed_history("001_users", 1);
        let mut migrator = Migrator::new(Arc::new(conn), MigrationConfig::default()).unwrap();
        migrator.register(CreateTable("002_posts", "posts"));
        migrator.register(CreateTable("001_users", "users"));

        let status = migrator.status().await.unwrap();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].name, "001_users");
        assert!(matches!(status[0].status, MigrationStatus::Applied { batch: 1, .. }));
        assert_eq!(status[1].status, MigrationStatus::Pending);
    }
}
