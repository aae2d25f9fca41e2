//! In-memory connection for tests
//!
//! `RecordingConnection` speaks just enough of the history-table protocol and
//! of table bookkeeping to drive the migrator without a database. Every
//! statement is recorded; DDL and history writes issued inside a transaction
//! only take effect on commit. Reading history before the history table
//! exists fails the way a database would. Clones share state, so a test can keep one
//! handle while the migrator owns another.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backends::{Connection, DatabaseRow, DatabaseValue, Transaction};
use crate::error::{MigrateError, MigrateResult};
use crate::grammar::{grammar_for, Grammar, PostgresGrammar};

/// A history row held by the fake
#[derive(Debug, Clone, PartialEq)]
pub struct FakeHistoryRow {
    pub id: i64,
    pub migration: String,
    pub batch: i32,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FakeState {
    tables: HashSet<String>,
    history: Vec<FakeHistoryRow>,
    next_id: i64,
    applied: Vec<String>,
    calls: Vec<(String, Vec<DatabaseValue>)>,
    fetches: usize,
    fail_patterns: Vec<String>,
    fail_begin: bool,
    begins: usize,
    commits: usize,
    rollbacks: usize,
}

#[derive(Debug)]
enum Effect {
    Ddl(String),
    CreateHistory(String),
    InsertHistory(String, i32),
    DeleteHistory(String),
}

/// Recording fake implementing [`Connection`]
#[derive(Clone)]
pub struct RecordingConnection {
    backend: String,
    grammar: Arc<dyn Grammar>,
    state: Arc<Mutex<FakeState>>,
}

impl std::fmt::Debug for RecordingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingConnection")
            .field("backend", &self.backend)
            .finish()
    }
}

impl RecordingConnection {
    /// Fake for the named backend; unknown names compile with the PostgreSQL grammar
    pub fn new(backend: &str) -> Self {
        let grammar: Arc<dyn Grammar> = match grammar_for(backend) {
            Some(grammar) => Arc::from(grammar),
            None => Arc::new(PostgresGrammar::new()),
        };
        Self {
            backend: backend.to_string(),
            grammar,
            state: Arc::new(Mutex::new(FakeState {
                next_id: 1,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every statement containing `pattern` fail
    pub fn fail_on(&self, pattern: &str) {
        self.state().fail_patterns.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_patterns.clear();
        state.fail_begin = false;
    }

    /// Make `begin` fail
    pub fn fail_begin(&self) {
        self.state().fail_begin = true;
    }

    /// Pretend a table already exists
    pub fn add_table(&self, name: &str) {
        self.state().tables.insert(name.to_string());
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state().tables.contains(name)
    }

    /// Insert a history row directly
    pub fn seed_history(&self, name: &str, batch: i32) {
        let mut state = self.state();
        insert_history(&mut state, name, batch);
    }

    /// History rows in insertion order
    pub fn history(&self) -> Vec<FakeHistoryRow> {
        self.state().history.clone()
    }

    /// `(name, batch)` pairs in insertion order
    pub fn history_names(&self) -> Vec<(String, i32)> {
        self.state()
            .history
            .iter()
            .map(|row| (row.migration.clone(), row.batch))
            .collect()
    }

    /// Schema statements that took effect, excluding history bookkeeping
    pub fn executed(&self) -> Vec<String> {
        self.state().applied.clone()
    }

    /// Every execute call, direct or in a transaction, with its parameters
    pub fn calls(&self) -> Vec<(String, Vec<DatabaseValue>)> {
        self.state().calls.clone()
    }

    pub fn execute_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn fetch_calls(&self) -> usize {
        self.state().fetches
    }

    pub fn begin_count(&self) -> usize {
        self.state().begins
    }

    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    pub fn rollback_count(&self) -> usize {
        self.state().rollbacks
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn backend_name(&self) -> &str {
        &self.backend
    }

    fn grammar(&self) -> &dyn Grammar {
        self.grammar.as_ref()
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let mut state = self.state();
        let effect = record_call(&mut state, sql, params)?;
        Ok(apply(&mut state, effect))
    }

    async fn fetch_all(&self, sql: &str, _params: &[DatabaseValue]) -> MigrateResult<Vec<Box<dyn DatabaseRow>>> {
        let mut state = self.state();
        state.fetches += 1;
        check_failure(&state, sql)?;

        let reads_history =
            sql.contains("COALESCE(MAX(batch)") || sql.starts_with("SELECT id, migration, batch, executed_at");
        if reads_history {
            let table = source_table(sql);
            if !state.tables.contains(&table) {
                return Err(MigrateError::Database(format!("relation \"{}\" does not exist", table)));
            }
        }

        if sql.contains("COALESCE(MAX(batch)") {
            let max = state.history.iter().map(|row| row.batch).max().unwrap_or(0);
            return Ok(vec![FakeRow::boxed(vec![("max", DatabaseValue::Int32(max))])]);
        }

        if sql.starts_with("SELECT id, migration, batch, executed_at") {
            let text_timestamps = self.grammar.name() == "sqlite";
            let mut rows = state.history.clone();
            rows.sort_by(|a, b| a.batch.cmp(&b.batch).then_with(|| a.migration.cmp(&b.migration)));
            return Ok(rows
                .into_iter()
                .map(|row| {
                    let executed_at = if text_timestamps {
                        DatabaseValue::String(row.executed_at.format("%Y-%m-%d %H:%M:%S").to_string())
                    } else {
                        DatabaseValue::DateTime(row.executed_at)
                    };
                    FakeRow::boxed(vec![
                        ("id", DatabaseValue::Int64(row.id)),
                        ("migration", DatabaseValue::String(row.migration)),
                        ("batch", DatabaseValue::Int32(row.batch)),
                        ("executed_at", executed_at),
                    ])
                })
                .collect());
        }

        if sql.starts_with("SELECT COUNT(*)") {
            let name = quoted_literal(sql).unwrap_or_default();
            let count = i64::from(state.tables.contains(name));
            return Ok(vec![FakeRow::boxed(vec![("count", DatabaseValue::Int64(count))])]);
        }

        Ok(Vec::new())
    }

    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>> {
        let mut state = self.state();
        if state.fail_begin {
            return Err(MigrateError::Transaction("begin refused".to_string()));
        }
        state.begins += 1;
        Ok(Box::new(RecordingTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
        }))
    }
}

/// Transaction that buffers effects until commit
pub struct RecordingTransaction {
    state: Arc<Mutex<FakeState>>,
    pending: Vec<Effect>,
}

impl RecordingTransaction {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Transaction for RecordingTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> MigrateResult<u64> {
        let effect = {
            let mut state = self.state();
            record_call(&mut state, sql, params)?
        };
        self.pending.push(effect);
        Ok(0)
    }

    async fn commit(self: Box<Self>) -> MigrateResult<()> {
        let RecordingTransaction { state, pending } = *self;
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        check_failure(&state, "COMMIT")?;
        for effect in pending {
            apply(&mut state, effect);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrateResult<()> {
        let mut state = self.state();
        state.rollbacks += 1;
        Ok(())
    }
}

fn check_failure(state: &FakeState, sql: &str) -> MigrateResult<()> {
    match state.fail_patterns.iter().find(|pattern| sql.contains(pattern.as_str())) {
        Some(pattern) => Err(MigrateError::Database(format!("injected failure on '{}'", pattern))),
        None => Ok(()),
    }
}

fn record_call(state: &mut FakeState, sql: &str, params: &[DatabaseValue]) -> MigrateResult<Effect> {
    state.calls.push((sql.to_string(), params.to_vec()));
    check_failure(state, sql)?;
    classify(sql, params)
}

fn classify(sql: &str, params: &[DatabaseValue]) -> MigrateResult<Effect> {
    if sql.contains("(migration, batch) VALUES") {
        let name = params.first().and_then(|p| p.as_str()).unwrap_or_default();
        let batch = params
            .get(1)
            .and_then(|p| p.as_i64())
            .and_then(|b| i32::try_from(b).ok())
            .ok_or_else(|| MigrateError::Database("history insert without a batch".to_string()))?;
        return Ok(Effect::InsertHistory(name.to_string(), batch));
    }
    if sql.starts_with("DELETE FROM") && sql.contains("WHERE migration =") {
        let name = params.first().and_then(|p| p.as_str()).unwrap_or_default();
        return Ok(Effect::DeleteHistory(name.to_string()));
    }
    if sql.starts_with("CREATE TABLE IF NOT EXISTS") && sql.contains("batch INT") {
        return Ok(Effect::CreateHistory(first_identifier(sql, "CREATE TABLE IF NOT EXISTS")));
    }
    Ok(Effect::Ddl(sql.to_string()))
}

fn apply(state: &mut FakeState, effect: Effect) -> u64 {
    match effect {
        Effect::CreateHistory(table) => {
            state.tables.insert(table);
            0
        }
        Effect::InsertHistory(name, batch) => {
            insert_history(state, &name, batch);
            1
        }
        Effect::DeleteHistory(name) => {
            let before = state.history.len();
            state.history.retain(|row| row.migration != name);
            (before - state.history.len()) as u64
        }
        Effect::Ddl(sql) => {
            track_tables(&mut state.tables, &sql);
            state.applied.push(sql);
            0
        }
    }
}

fn insert_history(state: &mut FakeState, name: &str, batch: i32) {
    let id = state.next_id;
    state.next_id += 1;
    state.history.push(FakeHistoryRow {
        id,
        migration: name.to_string(),
        batch,
        executed_at: Utc::now(),
    });
}

/// Keep the table set roughly in step with CREATE/DROP/RENAME statements
fn track_tables(tables: &mut HashSet<String>, sql: &str) {
    if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
        tables.insert(first_identifier(sql, "CREATE TABLE IF NOT EXISTS"));
    } else if sql.starts_with("CREATE TABLE") {
        tables.insert(first_identifier(sql, "CREATE TABLE"));
    } else if sql.starts_with("DROP TABLE IF EXISTS") {
        tables.remove(&first_identifier(sql, "DROP TABLE IF EXISTS"));
    } else if sql.starts_with("DROP TABLE") {
        tables.remove(&first_identifier(sql, "DROP TABLE"));
    } else if sql.starts_with("RENAME TABLE") {
        let rest = &sql["RENAME TABLE".len()..];
        if let Some((from, to)) = rest.split_once(" TO ") {
            rename(tables, &unquote(from), &unquote(to));
        }
    } else if sql.starts_with("ALTER TABLE") {
        let rest = &sql["ALTER TABLE".len()..];
        if let Some((from, to)) = rest.split_once(" RENAME TO ") {
            rename(tables, &unquote(from), &unquote(to));
        }
    }
}

fn rename(tables: &mut HashSet<String>, from: &str, to: &str) {
    if tables.remove(from) {
        tables.insert(to.to_string());
    }
}

fn first_identifier(sql: &str, prefix: &str) -> String {
    let rest = sql[prefix.len()..].trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    unquote(&rest[..end])
}

fn unquote(identifier: &str) -> String {
    identifier
        .trim()
        .trim_matches(|c| c == '"' || c == '`')
        .to_string()
}

fn source_table(sql: &str) -> String {
    match sql.split_once(" FROM ") {
        Some((_, rest)) => unquote(rest.split_whitespace().next().unwrap_or_default()),
        None => String::new(),
    }
}

/// The last single-quoted literal in a statement
fn quoted_literal(sql: &str) -> Option<&str> {
    let end = sql.rfind('\'')?;
    let start = sql[..end].rfind('\'')?;
    Some(&sql[start + 1..end])
}

struct FakeRow {
    columns: Vec<(&'static str, DatabaseValue)>,
}

impl FakeRow {
    fn boxed(columns: Vec<(&'static str, DatabaseValue)>) -> Box<dyn DatabaseRow> {
        Box::new(Self { columns })
    }
}

impl DatabaseRow for FakeRow {
    fn get_by_index(&self, index: usize) -> MigrateResult<DatabaseValue> {
        self.columns
            .get(index)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| MigrateError::Database(format!("Column index {} out of range", index)))
    }

    fn get_by_name(&self, name: &str) -> MigrateResult<DatabaseValue> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| MigrateError::Database(format!("Column '{}' not found", name)))
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }
}
