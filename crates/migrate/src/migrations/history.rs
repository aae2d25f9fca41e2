//! Migration history table
//!
//! Reads and writes the bookkeeping table that records which migrations ran
//! and in which batch. Inserts and deletes always bind the migration name as a
//! parameter; only the validated table name is interpolated.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::definitions::MigrationRecord;
use crate::backends::{Connection, DatabaseRow, DatabaseValue, Transaction};
use crate::error::{MigrateError, MigrateResult};

/// Access to the history table on one connection
#[derive(Clone)]
pub struct MigrationHistory {
    connection: Arc<dyn Connection>,
    table: String,
}

impl std::fmt::Debug for MigrationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationHistory")
            .field("backend", &self.connection.backend_name())
            .field("table", &self.table)
            .finish()
    }
}

impl MigrationHistory {
    pub fn new(connection: Arc<dyn Connection>, table: &str) -> Self {
        Self {
            connection,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table if it does not exist yet
    pub async fn ensure_table(&self) -> MigrateResult<()> {
        let sql = self.connection.grammar().compile_create_migrations_table(&self.table);
        self.connection.execute(&sql, &[]).await?;
        Ok(())
    }

    /// All records, ordered by batch then name
    pub async fn records(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let sql = self.connection.grammar().compile_get_migrations(&self.table);
        let rows = self.connection.fetch_all(&sql, &[]).await?;
        rows.iter().map(|row| record_from_row(row.as_ref())).collect()
    }

    /// Highest batch number, 0 when nothing has run
    pub async fn last_batch(&self) -> MigrateResult<i32> {
        let sql = self.connection.grammar().compile_get_last_batch(&self.table);
        let rows = self.connection.fetch_all(&sql, &[]).await?;
        match rows.first() {
            Some(row) => {
                let value = row.get_by_index(0)?;
                if value.is_null() {
                    return Ok(0);
                }
                let batch = value
                    .as_i64()
                    .ok_or_else(|| MigrateError::History(format!("Unexpected batch value: {:?}", value)))?;
                i32::try_from(batch)
                    .map_err(|_| MigrateError::History(format!("Batch number {} out of range", batch)))
            }
            None => Ok(0),
        }
    }

    /// Insert a record on the connection
    pub async fn record(&self, name: &str, batch: i32) -> MigrateResult<()> {
        let sql = self.connection.grammar().compile_insert_migration(&self.table);
        self.connection.execute(&sql, &insert_params(name, batch)).await?;
        Ok(())
    }

    /// Insert a record inside `tx`
    pub async fn record_in(&self, tx: &mut dyn Transaction, name: &str, batch: i32) -> MigrateResult<()> {
        let sql = self.connection.grammar().compile_insert_migration(&self.table);
        tx.execute(&sql, &insert_params(name, batch)).await?;
        Ok(())
    }

    /// Delete a record on the connection
    pub async fn delete(&self, name: &str) -> MigrateResult<()> {
        let sql = self.connection.grammar().compile_delete_migration(&self.table);
        self.connection.execute(&sql, &[DatabaseValue::from(name)]).await?;
        Ok(())
    }

    /// Delete a record inside `tx`
    pub async fn delete_in(&self, tx: &mut dyn Transaction, name: &str) -> MigrateResult<()> {
        let sql = self.connection.grammar().compile_delete_migration(&self.table);
        tx.execute(&sql, &[DatabaseValue::from(name)]).await?;
        Ok(())
    }
}

fn insert_params(name: &str, batch: i32) -> [DatabaseValue; 2] {
    [DatabaseValue::from(name), DatabaseValue::Int32(batch)]
}

fn record_from_row(row: &dyn DatabaseRow) -> MigrateResult<MigrationRecord> {
    let id = row.get_by_name("id")?.as_i64().unwrap_or_default();

    let migration = match row.get_by_name("migration")? {
        DatabaseValue::String(name) => name,
        other => {
            return Err(MigrateError::History(format!(
                "Unexpected migration name value: {:?}",
                other
            )))
        }
    };

    let batch_value = row.get_by_name("batch")?;
    let batch = batch_value
        .as_i64()
        .and_then(|b| i32::try_from(b).ok())
        .ok_or_else(|| MigrateError::History(format!("Unexpected batch value for {}: {:?}", migration, batch_value)))?;

    let executed_at = parse_executed_at(&row.get_by_name("executed_at")?);

    Ok(MigrationRecord {
        id,
        migration,
        batch,
        executed_at,
    })
}

/// Timestamps arrive natively or, on SQLite, as `YYYY-MM-DD HH:MM:SS` text
fn parse_executed_at(value: &DatabaseValue) -> Option<DateTime<Utc>> {
    match value {
        DatabaseValue::DateTime(dt) => Some(*dt),
        DatabaseValue::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;
    use chrono::TimeZone;

    #[test]
    fn test_parse_executed_at() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            parse_executed_at(&DatabaseValue::from("2024-03-01 12:30:00")),
            Some(expected)
        );
        assert_eq!(
            parse_executed_at(&DatabaseValue::from("2024-03-01T12:30:00Z")),
            Some(expected)
        );
        assert_eq!(parse_executed_at(&DatabaseValue::DateTime(expected)), Some(expected));
        assert_eq!(parse_executed_at(&DatabaseValue::Null), None);
        assert_eq!(parse_executed_at(&DatabaseValue::from("yesterday")), None);
    }

    #[tokio::test]
    async fn test_record_and_delete() {
        let conn = Arc::new(RecordingConnection::new("mysql"));
        let history = MigrationHistory::new(conn.clone(), "migrations");

        history.ensure_table().await.unwrap();
        assert_eq!(history.last_batch().await.unwrap(), 0);

        history.record("001_users", 1).await.unwrap();
        history.record("002_posts", 2).await.unwrap();
        assert_eq!(history.last_batch().await.unwrap(), 2);

        let records = history.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].migration, "001_users");
        assert_eq!(records[1].batch, 2);
        assert!(records[0].executed_at.is_some());

        history.delete("002_posts").await.unwrap();
        assert_eq!(history.last_batch().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_names_are_bound_not_interpolated() {
        let conn = Arc::new(RecordingConnection::new("postgres"));
        let history = MigrationHistory::new(conn.clone(), "migrations");

        history.record("x'); DROP TABLE users; --", 1).await.unwrap();

        let calls = conn.calls();
        let insert = calls.last().unwrap();
        assert_eq!(insert.0, "INSERT INTO \"migrations\" (migration, batch) VALUES ($1, $2)");
        assert_eq!(
            insert.1,
            vec![
                DatabaseValue::from("x'); DROP TABLE users; --"),
                DatabaseValue::Int32(1)
            ]
        );
    }
}
