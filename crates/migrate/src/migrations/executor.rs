//! Executor - runs compiled DDL for a migration body
//!
//! Every mutating operation compiles through the connection's grammar and then
//! goes to exactly one place: the live connection, an open transaction, or the
//! dry-run statement list. Existence checks always read the live database.

use tracing::debug;

use crate::backends::{Connection, Transaction};
use crate::error::{MigrateError, MigrateResult};
use crate::grammar::Grammar;
use crate::schema::Table;

/// Where compiled statements go
pub enum ExecutionMode<'a> {
    /// Execute immediately on the connection
    Direct,
    /// Execute inside a transaction owned by the caller
    Transaction(&'a mut dyn Transaction),
    /// Record without executing
    DryRun,
}

impl std::fmt::Debug for ExecutionMode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Direct => write!(f, "Direct"),
            ExecutionMode::Transaction(_) => write!(f, "Transaction"),
            ExecutionMode::DryRun => write!(f, "DryRun"),
        }
    }
}

/// Schema handle passed to migration bodies
pub struct Executor<'a> {
    connection: &'a dyn Connection,
    mode: ExecutionMode<'a>,
    statements: Vec<String>,
}

impl<'a> Executor<'a> {
    /// Executor that runs statements directly on the connection
    pub fn new(connection: &'a dyn Connection) -> Self {
        Self::with_mode(connection, ExecutionMode::Direct)
    }

    /// Executor that runs statements inside `transaction`
    pub fn with_transaction(connection: &'a dyn Connection, transaction: &'a mut dyn Transaction) -> Self {
        Self::with_mode(connection, ExecutionMode::Transaction(transaction))
    }

    /// Executor that only records statements
    pub fn dry_run(connection: &'a dyn Connection) -> Self {
        Self::with_mode(connection, ExecutionMode::DryRun)
    }

    pub fn with_mode(connection: &'a dyn Connection, mode: ExecutionMode<'a>) -> Self {
        Self {
            connection,
            mode,
            statements: Vec::new(),
        }
    }

    pub fn mode(&self) -> &ExecutionMode<'a> {
        &self.mode
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.mode, ExecutionMode::DryRun)
    }

    /// Grammar of the underlying connection
    pub fn grammar(&self) -> &'a dyn Grammar {
        self.connection.grammar()
    }

    /// Create a table from a blueprint; indexes the dialect cannot declare
    /// inline follow as separate statements
    pub async fn create_table<F>(&mut self, name: &str, build: F) -> MigrateResult<()>
    where
        F: FnOnce(&mut Table) + Send,
    {
        let mut table = Table::new(name);
        build(&mut table);
        let statements = self.grammar().compile_create_statements(&table);
        self.run_all(statements).await
    }

    /// Alter an existing table
    ///
    /// Fails with [`MigrateError::UnsupportedAlter`] before anything runs when
    /// the blueprint asks for operations the dialect cannot perform in place.
    pub async fn alter_table<F>(&mut self, name: &str, build: F) -> MigrateResult<()>
    where
        F: FnOnce(&mut Table) + Send,
    {
        let mut table = Table::alter(name);
        build(&mut table);

        let grammar = self.grammar();
        let unsupported = grammar.unsupported_alter_operations(&table);
        if !unsupported.is_empty() {
            return Err(MigrateError::UnsupportedAlter {
                backend: grammar.name().to_string(),
                table: name.to_string(),
                operations: unsupported,
            });
        }

        let statements = grammar.compile_alter(&table);
        self.run_all(statements).await
    }

    pub async fn drop_table(&mut self, name: &str) -> MigrateResult<()> {
        let sql = self.grammar().compile_drop(name);
        self.run(sql).await
    }

    pub async fn drop_table_if_exists(&mut self, name: &str) -> MigrateResult<()> {
        let sql = self.grammar().compile_drop_if_exists(name);
        self.run(sql).await
    }

    pub async fn rename_table(&mut self, from: &str, to: &str) -> MigrateResult<()> {
        let sql = self.grammar().compile_rename(from, to);
        self.run(sql).await
    }

    /// Run a raw statement through the same dispatch as generated DDL
    pub async fn raw(&mut self, sql: &str) -> MigrateResult<()> {
        self.run(sql.to_string()).await
    }

    /// Whether a table exists, read from the live database in every mode
    pub async fn has_table(&self, name: &str) -> MigrateResult<bool> {
        let sql = self.grammar().compile_has_table(name)?;
        let rows = self.connection.fetch_all(&sql, &[]).await?;

        let count = match rows.first() {
            Some(row) => row.get_by_index(0)?.as_i64().unwrap_or(0),
            None => 0,
        };
        Ok(count > 0)
    }

    /// Statements recorded in dry-run mode, in order
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }

    async fn run_all(&mut self, statements: Vec<String>) -> MigrateResult<()> {
        for sql in statements {
            self.run(sql).await?;
        }
        Ok(())
    }

    async fn run(&mut self, sql: String) -> MigrateResult<()> {
        if sql.trim().is_empty() {
            return Ok(());
        }

        match &mut self.mode {
            ExecutionMode::DryRun => {
                debug!("Recording statement: {}", sql);
                self.statements.push(sql);
            }
            ExecutionMode::Direct => {
                debug!("Executing statement: {}", sql);
                self.connection.execute(&sql, &[]).await?;
            }
            ExecutionMode::Transaction(tx) => {
                debug!("Executing statement in transaction: {}", sql);
                tx.execute(&sql, &[]).await?;
            }
        }
        Ok(())
    }
}
