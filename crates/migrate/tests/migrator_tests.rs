use std::sync::Arc;

use async_trait::async_trait;
use elif_migrate::testing::RecordingConnection;
use elif_migrate::{
    Executor, MigrateError, Migration, MigrationConfig, MigrationDirection, MigrationRollback,
    MigrationStatus, Migrator, RefreshError,
};

/// Creates a table on up, drops it on down
struct CreateTable {
    name: &'static str,
    table: &'static str,
}

#[async_trait]
impl Migration for CreateTable {
    fn name(&self) -> &str {
        self.name
    }

    async fn up(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
        schema
            .create_table(self.table, |t| {
                t.id();
                t.string("name", 100);
                t.timestamps();
            })
            .await?;
        Ok(())
    }

    async fn down(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
        schema.drop_table(self.table).await?;
        Ok(())
    }
}

/// Creates its table and then fails in the chosen direction
struct Broken {
    name: &'static str,
    table: &'static str,
    fails: MigrationDirection,
}

#[async_trait]
impl Migration for Broken {
    fn name(&self) -> &str {
        self.name
    }

    async fn up(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
        schema
            .create_table(self.table, |t| {
                t.id();
            })
            .await?;
        if self.fails == MigrationDirection::Up {
            anyhow::bail!("up exploded after creating {}", self.table);
        }
        Ok(())
    }

    async fn down(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
        schema.drop_table(self.table).await?;
        if self.fails == MigrationDirection::Down {
            anyhow::bail!("down exploded after dropping {}", self.table);
        }
        Ok(())
    }
}

/// Branches on the live schema before creating
struct CreateUnlessPresent;

#[async_trait]
impl Migration for CreateUnlessPresent {
    fn name(&self) -> &str {
        "004_audit"
    }

    async fn up(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
        if !schema.has_table("audit").await? {
            schema
                .create_table("audit", |t| {
                    t.id();
                    t.text("entry");
                })
                .await?;
        }
        Ok(())
    }

    async fn down(&self, schema: &mut Executor<'_>) -> anyhow::Result<()> {
        schema.drop_table_if_exists("audit").await?;
        Ok(())
    }
}

fn table(name: &'static str, table: &'static str) -> CreateTable {
    CreateTable { name, table }
}

fn migrator(conn: &RecordingConnection) -> Migrator {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("003_comments", "comments"));
    migrator.register(table("001_users", "users"));
    migrator.register(table("002_posts", "posts"));
    migrator
}

#[tokio::test]
async fn test_up_applies_in_name_order_as_one_batch() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = migrator(&conn);

    let executed = migrator.up(0).await.unwrap();
    assert_eq!(executed, vec!["001_users", "002_posts", "003_comments"]);
    assert_eq!(
        conn.history_names(),
        vec![
            ("001_users".to_string(), 1),
            ("002_posts".to_string(), 1),
            ("003_comments".to_string(), 1),
        ]
    );

    migrator.register(table("004_tags", "tags"));
    assert_eq!(migrator.up(0).await.unwrap(), vec!["004_tags"]);
    assert_eq!(conn.history_names().last().unwrap(), &("004_tags".to_string(), 2));
}

#[tokio::test]
async fn test_up_with_no_pending_does_nothing() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();

    assert!(migrator.up(0).await.unwrap().is_empty());
    assert_eq!(conn.begin_count(), 0);
    assert!(conn.executed().is_empty());
    assert!(conn.history().is_empty());
}

#[tokio::test]
async fn test_step_limits_up() {
    let conn = RecordingConnection::new("sqlite");
    let mut migrator = migrator(&conn);

    assert_eq!(migrator.up(1).await.unwrap(), vec!["001_users"]);
    assert_eq!(migrator.up(0).await.unwrap(), vec!["002_posts", "003_comments"]);
    assert_eq!(
        conn.history_names(),
        vec![
            ("001_users".to_string(), 1),
            ("002_posts".to_string(), 2),
            ("003_comments".to_string(), 2),
        ]
    );
}

#[tokio::test]
async fn test_down_reverts_last_batch_in_reverse() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = migrator(&conn);
    migrator.up(0).await.unwrap();

    let rolled_back = migrator.down(0).await.unwrap();
    assert_eq!(rolled_back, vec!["003_comments", "002_posts", "001_users"]);
    assert!(conn.history().is_empty());
    assert!(!conn.has_table("users"));

    let drops: Vec<String> = conn
        .executed()
        .into_iter()
        .filter(|sql| sql.starts_with("DROP TABLE"))
        .collect();
    assert_eq!(
        drops,
        vec![
            "DROP TABLE \"comments\"",
            "DROP TABLE \"posts\"",
            "DROP TABLE \"users\"",
        ]
    );
}

#[tokio::test]
async fn test_down_and_reset_before_any_up() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = migrator(&conn);

    assert!(migrator.down(0).await.unwrap().is_empty());
    assert!(migrator.reset().await.unwrap().is_empty());
    assert!(conn.has_table("migrations"));
    assert_eq!(conn.begin_count(), 0);

    let outcome = migrator.refresh().await.unwrap();
    assert!(outcome.rolled_back.is_empty());
    assert_eq!(outcome.executed, vec!["001_users", "002_posts", "003_comments"]);
}

#[tokio::test]
async fn test_postgresql_alias_runs_in_transactions() {
    let conn = RecordingConnection::new("postgresql");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(Broken {
        name: "001_users",
        table: "users",
        fails: MigrationDirection::Up,
    });

    let err = migrator.up(0).await.unwrap_err();
    assert!(err.error.was_rolled_back());
    assert!(!conn.has_table("users"));
    assert_eq!((conn.begin_count(), conn.rollback_count()), (1, 1));
}

#[tokio::test]
async fn test_down_only_touches_last_batch() {
    let conn = RecordingConnection::new("mysql");
    let mut migrator = migrator(&conn);
    migrator.up(1).await.unwrap();
    migrator.up(0).await.unwrap();

    assert_eq!(migrator.down(0).await.unwrap(), vec!["003_comments", "002_posts"]);
    assert_eq!(conn.history_names(), vec![("001_users".to_string(), 1)]);

    assert!(migrator.down(0).await.unwrap() == vec!["001_users"]);
    assert!(migrator.down(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_down_with_step() {
    let conn = RecordingConnection::new("sqlite");
    let mut migrator = migrator(&conn);
    migrator.up(1).await.unwrap();
    migrator.up(0).await.unwrap();

    assert_eq!(migrator.down(2).await.unwrap(), vec!["003_comments", "002_posts"]);
    assert_eq!(migrator.down(5).await.unwrap(), vec!["001_users"]);
}

#[tokio::test]
async fn test_up_stops_at_first_failure() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_users", "users"));
    migrator.register(Broken {
        name: "002_posts",
        table: "posts",
        fails: MigrationDirection::Up,
    });
    migrator.register(table("003_comments", "comments"));

    let err = migrator.up(0).await.unwrap_err();
    assert_eq!(err.completed, vec!["001_users"]);
    match &err.error {
        MigrateError::MigrationFailed {
            name,
            direction,
            rolled_back,
            source,
        } => {
            assert_eq!(name, "002_posts");
            assert_eq!(*direction, MigrationDirection::Up);
            assert!(*rolled_back);
            assert!(source.to_string().contains("up exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(conn.history_names(), vec![("001_users".to_string(), 1)]);
    assert!(!conn.has_table("posts"));
    assert!(!conn.has_table("comments"));
    assert_eq!(conn.rollback_count(), 1);
}

#[tokio::test]
async fn test_failure_without_transactional_ddl_is_not_undone() {
    let conn = RecordingConnection::new("mysql");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(Broken {
        name: "001_users",
        table: "users",
        fails: MigrationDirection::Up,
    });

    let err = migrator.up(0).await.unwrap_err();
    assert!(err.completed.is_empty());
    assert!(matches!(err.error, MigrateError::MigrationFailed { rolled_back: false, .. }));
    assert!(!err.error.was_rolled_back());

    // The CREATE ran before the failure and stays applied, with no history row
    assert!(conn.has_table("users"));
    assert!(conn.history().is_empty());
    assert_eq!(conn.begin_count(), 0);
}

#[tokio::test]
async fn test_history_write_failure_rolls_back_ddl_on_postgres() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_users", "users"));
    conn.fail_on("INSERT INTO");

    let err = migrator.up(0).await.unwrap_err();
    match &err.error {
        MigrateError::HistoryWrite {
            name,
            direction,
            rolled_back,
            ..
        } => {
            assert_eq!(name, "001_users");
            assert_eq!(*direction, MigrationDirection::Up);
            assert!(*rolled_back);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!conn.has_table("users"));
    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn test_history_write_failure_leaves_ddl_on_mysql() {
    let conn = RecordingConnection::new("mysql");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_users", "users"));
    conn.fail_on("INSERT INTO");

    let err = migrator.up(0).await.unwrap_err();
    assert!(matches!(err.error, MigrateError::HistoryWrite { rolled_back: false, .. }));
    assert!(conn.has_table("users"));
    assert!(conn.history().is_empty());
}

#[tokio::test]
async fn test_begin_failure_stops_run() {
    let conn = RecordingConnection::new("sqlite");
    let mut migrator = migrator(&conn);
    conn.fail_begin();

    let err = migrator.up(0).await.unwrap_err();
    assert!(err.completed.is_empty());
    match &err.error {
        MigrateError::TransactionFailed { name, direction, source } => {
            assert_eq!(name, "001_users");
            assert_eq!(*direction, MigrationDirection::Up);
            assert!(matches!(**source, MigrateError::Transaction(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("001_users"));
    assert!(conn.history().is_empty());
}

#[tokio::test]
async fn test_commit_failure_names_migration() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_users", "users"));
    migrator.up(0).await.unwrap();
    migrator.register(table("002_posts", "posts"));
    conn.fail_on("COMMIT");

    let err = migrator.up(0).await.unwrap_err();
    assert!(err.completed.is_empty());
    assert!(matches!(
        &err.error,
        MigrateError::TransactionFailed { name, direction: MigrationDirection::Up, .. } if name == "002_posts"
    ));
    assert!(!conn.has_table("posts"));
    assert_eq!(conn.history_names(), vec![("001_users".to_string(), 1)]);

    let err = migrator.down(0).await.unwrap_err();
    assert!(matches!(
        &err.error,
        MigrateError::TransactionFailed { name, direction: MigrationDirection::Down, .. } if name == "001_users"
    ));
    assert!(conn.has_table("users"));
}

#[tokio::test]
async fn test_failed_down_keeps_history_record() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_users", "users"));
    migrator.register(Broken {
        name: "002_posts",
        table: "posts",
        fails: MigrationDirection::Down,
    });
    migrator.up(0).await.unwrap();

    let err = migrator.down(0).await.unwrap_err();
    assert!(err.completed.is_empty());
    assert!(matches!(
        err.error,
        MigrateError::MigrationFailed {
            direction: MigrationDirection::Down,
            rolled_back: true,
            ..
        }
    ));
    assert_eq!(conn.history().len(), 2);
    assert!(conn.has_table("posts"));
}

#[tokio::test]
async fn test_orphaned_history_is_fatal() {
    let conn = RecordingConnection::new("postgres");
    conn.seed_history("001_users", 1);
    conn.seed_history("009_removed", 1);
    let mut migrator = migrator(&conn);

    let err = migrator.down(0).await.unwrap_err();
    assert!(err.completed.is_empty());
    match err.error {
        MigrateError::OrphanedHistory(name) => assert_eq!(name, "009_removed"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(conn.history().len(), 2);
}

#[tokio::test]
async fn test_reset_reverts_everything() {
    let conn = RecordingConnection::new("sqlite");
    let mut migrator = migrator(&conn);
    migrator.up(1).await.unwrap();
    migrator.up(1).await.unwrap();
    migrator.up(1).await.unwrap();

    let rolled_back = migrator.reset().await.unwrap();
    assert_eq!(rolled_back, vec!["003_comments", "002_posts", "001_users"]);
    assert!(conn.history().is_empty());
    assert!(migrator.reset().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_round_trip() {
    let conn = RecordingConnection::new("postgres");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_a", "a"));
    migrator.register(table("002_b", "b"));

    let first = migrator.refresh().await.unwrap();
    assert!(first.rolled_back.is_empty());
    assert_eq!(first.executed, vec!["001_a", "002_b"]);

    let second = migrator.refresh().await.unwrap();
    assert_eq!(second.rolled_back, vec!["002_b", "001_a"]);
    assert_eq!(second.executed, vec!["001_a", "002_b"]);
    assert_eq!(
        conn.history_names(),
        vec![("001_a".to_string(), 1), ("002_b".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_refresh_stops_when_reset_fails() {
    let conn = RecordingConnection::new("postgres");
    conn.seed_history("000_unknown", 1);
    let mut migrator = migrator(&conn);

    match migrator.refresh().await.unwrap_err() {
        RefreshError::Reset(err) => {
            assert!(matches!(err.error, MigrateError::OrphanedHistory(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(conn.begin_count(), 0);
}

#[tokio::test]
async fn test_refresh_reports_up_failure() {
    let conn = RecordingConnection::new("mysql");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::default()).unwrap();
    migrator.register(table("001_users", "users"));
    migrator.up(0).await.unwrap();
    migrator.register(Broken {
        name: "002_posts",
        table: "posts",
        fails: MigrationDirection::Up,
    });

    match migrator.refresh().await.unwrap_err() {
        RefreshError::Up { rolled_back, error } => {
            assert_eq!(rolled_back, vec!["001_users"]);
            assert_eq!(error.completed, vec!["001_users"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_status_reports_batches() {
    let conn = RecordingConnection::new("sqlite");
    let mut migrator = migrator(&conn);
    migrator.up(2).await.unwrap();

    let status = migrator.status().await.unwrap();
    let names: Vec<&str> = status.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["001_users", "002_posts", "003_comments"]);

    match &status[0].status {
        MigrationStatus::Applied { batch, executed_at } => {
            assert_eq!(*batch, 1);
            assert!(executed_at.is_some());
        }
        MigrationStatus::Pending => panic!("001_users should be applied"),
    }
    assert!(status[1].status.is_applied());
    assert_eq!(status[2].status, MigrationStatus::Pending);
}

#[tokio::test]
async fn test_dry_run_records_sql_without_applying() {
    let conn = RecordingConnection::new("postgres");
    conn.add_table("audit");
    let mut migrator =
        Migrator::new(Arc::new(conn.clone()), MigrationConfig::default().with_dry_run(true)).unwrap();
    migrator.register(table("001_users", "users"));
    migrator.register(CreateUnlessPresent);

    let executed = migrator.up(0).await.unwrap();
    assert_eq!(executed, vec!["001_users", "004_audit"]);

    let sql = migrator.dry_run_sql();
    assert_eq!(sql.len(), 1);
    assert!(sql[0].starts_with("CREATE TABLE \"users\""));

    assert!(conn.executed().is_empty());
    assert!(conn.history().is_empty());
    assert_eq!(conn.begin_count(), 0);
    assert!(!conn.has_table("users"));

    assert_eq!(migrator.take_dry_run_sql().len(), 1);
    assert!(migrator.dry_run_sql().is_empty());
}

#[tokio::test]
async fn test_custom_history_table() {
    let conn = RecordingConnection::new("mysql");
    let mut migrator = Migrator::new(Arc::new(conn.clone()), MigrationConfig::new("schema_versions")).unwrap();
    migrator.register(table("001_users", "users"));
    migrator.up(0).await.unwrap();

    assert!(conn.has_table("schema_versions"));
    let calls = conn.calls();
    assert!(calls
        .iter()
        .any(|(sql, _)| sql == "INSERT INTO `schema_versions` (migration, batch) VALUES (?, ?)"));
}
