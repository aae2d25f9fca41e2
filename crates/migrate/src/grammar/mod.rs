//! Grammar - per-dialect DDL compilers
//!
//! A grammar turns a [`Table`] blueprint (or bare names) into SQL text. Grammars
//! never touch a connection; every function here is a pure string builder and is
//! tested against fixtures without a database.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

use crate::backends::BackendType;
use crate::error::MigrateResult;
use crate::schema::{Column, ColumnType, DefaultValue, ForeignKey, Index, IndexKind, Table};
use crate::security::{escape_string, quote_identifier, validate_identifier};

/// Dialect compiler for one database backend
pub trait Grammar: Send + Sync {
    /// Backend identifier, e.g. `postgres`
    fn name(&self) -> &'static str;

    /// Character used to quote identifiers
    fn quote_char(&self) -> char;

    /// Longest identifier the backend accepts
    fn max_identifier_length(&self) -> usize;

    /// Literal used for boolean defaults
    fn bool_literal(&self, value: bool) -> &'static str;

    /// Positional parameter marker, 1-based
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn wrap(&self, identifier: &str) -> String {
        quote_identifier(identifier, self.quote_char())
    }

    // Table statements

    fn compile_create(&self, table: &Table) -> String;

    /// Statements for an ALTER blueprint, ordered drops first:
    /// foreign keys, indexes, columns, renames, added/modified columns,
    /// indexes, foreign keys.
    fn compile_alter(&self, table: &Table) -> Vec<String>;

    /// Operations in an ALTER blueprint this dialect leaves out of
    /// [`Grammar::compile_alter`]. Empty when the blueprint compiles in full.
    fn unsupported_alter_operations(&self, _table: &Table) -> Vec<String> {
        Vec::new()
    }

    fn compile_drop(&self, name: &str) -> String {
        format!("DROP TABLE {}", self.wrap(name))
    }

    fn compile_drop_if_exists(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.wrap(name))
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", self.wrap(from), self.wrap(to))
    }

    /// Existence check for a table. The name is validated and then inlined
    /// as a string literal, so an unsafe name is an error and never SQL.
    fn compile_has_table(&self, name: &str) -> MigrateResult<String>;

    // Type mapping

    fn type_string(&self, length: u32) -> String;
    fn type_text(&self) -> String;
    fn type_tiny_integer(&self) -> String;
    fn type_small_integer(&self) -> String;
    fn type_integer(&self) -> String;
    fn type_big_integer(&self) -> String;
    fn type_float(&self) -> String;
    fn type_double(&self) -> String;
    fn type_decimal(&self, precision: u32, scale: u32) -> String;
    fn type_boolean(&self) -> String;
    fn type_date(&self) -> String;
    fn type_date_time(&self) -> String;
    fn type_timestamp(&self) -> String;
    fn type_time(&self) -> String;
    fn type_json(&self) -> String;
    fn type_binary(&self) -> String;
    fn type_uuid(&self) -> String;

    /// Native type for a column
    fn column_type(&self, column: &Column) -> String {
        match column.column_type {
            ColumnType::String(length) => self.type_string(length),
            ColumnType::Text => self.type_text(),
            ColumnType::TinyInteger => self.type_tiny_integer(),
            ColumnType::SmallInteger => self.type_small_integer(),
            ColumnType::Integer => self.type_integer(),
            ColumnType::BigInteger => self.type_big_integer(),
            ColumnType::Float => self.type_float(),
            ColumnType::Double => self.type_double(),
            ColumnType::Decimal { precision, scale } => self.type_decimal(precision, scale),
            ColumnType::Boolean => self.type_boolean(),
            ColumnType::Date => self.type_date(),
            ColumnType::DateTime => self.type_date_time(),
            ColumnType::Timestamp => self.type_timestamp(),
            ColumnType::Time => self.type_time(),
            ColumnType::Json => self.type_json(),
            ColumnType::Binary => self.type_binary(),
            ColumnType::Uuid => self.type_uuid(),
        }
    }

    /// Column definition fragment used by CREATE and ADD COLUMN
    fn compile_column(&self, column: &Column) -> String;

    fn format_default(&self, value: &DefaultValue) -> String {
        format_default(value, self.bool_literal(true), self.bool_literal(false))
    }

    // Indexes and foreign keys

    fn compile_index(&self, table: &str, index: &Index) -> String;

    fn compile_drop_index(&self, table: &str, name: &str) -> String;

    /// `None` when the dialect cannot add a foreign key to an existing table
    fn compile_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Option<String>;

    /// `None` when the dialect cannot drop a foreign key in place
    fn compile_drop_foreign_key(&self, table: &str, name: &str) -> Option<String>;

    /// Whether CREATE TABLE carries its own index definitions
    fn supports_inline_indexes(&self) -> bool {
        false
    }

    /// Index statements that must follow a CREATE TABLE
    fn compile_create_indexes(&self, table: &Table) -> Vec<String> {
        if self.supports_inline_indexes() {
            return Vec::new();
        }
        table
            .indexes
            .iter()
            .filter(|index| index.kind != IndexKind::Primary)
            .map(|index| self.compile_index(&table.name, index))
            .collect()
    }

    /// Everything needed to create a table: the CREATE itself, then any
    /// deferred index statements
    fn compile_create_statements(&self, table: &Table) -> Vec<String> {
        let mut statements = vec![self.compile_create(table)];
        statements.extend(self.compile_create_indexes(table));
        statements
    }

    // History table

    fn compile_create_migrations_table(&self, table: &str) -> String;

    fn compile_get_migrations(&self, table: &str) -> String {
        format!(
            "SELECT id, migration, batch, executed_at FROM {} ORDER BY batch, migration",
            self.wrap(table)
        )
    }

    fn compile_insert_migration(&self, table: &str) -> String {
        format!(
            "INSERT INTO {} (migration, batch) VALUES ({}, {})",
            self.wrap(table),
            self.placeholder(1),
            self.placeholder(2)
        )
    }

    fn compile_delete_migration(&self, table: &str) -> String {
        format!(
            "DELETE FROM {} WHERE migration = {}",
            self.wrap(table),
            self.placeholder(1)
        )
    }

    fn compile_get_last_batch(&self, table: &str) -> String {
        format!("SELECT COALESCE(MAX(batch), 0) FROM {}", self.wrap(table))
    }
}

/// Look up the grammar for a backend name (`postgres`, `mysql`, `sqlite`, or an alias)
pub fn grammar_for(name: &str) -> Option<Box<dyn Grammar>> {
    let backend: BackendType = name.parse().ok()?;
    let grammar: Box<dyn Grammar> = match backend {
        BackendType::PostgreSQL => Box::new(PostgresGrammar::new()),
        BackendType::MySQL => Box::new(MySqlGrammar::new()),
        BackendType::SQLite => Box::new(SqliteGrammar::new()),
    };
    Some(grammar)
}

/// Render a default value; strings are single-quoted with quotes doubled
pub fn format_default(value: &DefaultValue, true_literal: &str, false_literal: &str) -> String {
    match value {
        DefaultValue::Null => "NULL".to_string(),
        DefaultValue::Bool(true) => true_literal.to_string(),
        DefaultValue::Bool(false) => false_literal.to_string(),
        DefaultValue::Integer(i) => i.to_string(),
        DefaultValue::Float(f) => f.to_string(),
        DefaultValue::String(s) => format!("'{}'", escape_string(s)),
        DefaultValue::Expression(expr) => expr.clone(),
    }
}

/// Derived index name: `{table}_{col1}_{col2}_{suffix}`
pub fn generate_index_name(table: &str, columns: &[String], kind: IndexKind) -> String {
    format!("{}_{}_{}", table, columns.join("_"), kind.suffix())
}

/// Derived foreign key name: `{table}_{col1}_{col2}_fk`
pub fn generate_foreign_key_name(table: &str, columns: &[String]) -> String {
    format!("{}_{}_fk", table, columns.join("_"))
}

/// Explicit index name, or the derived one
pub(crate) fn index_name(table: &str, index: &Index) -> String {
    index
        .name
        .clone()
        .unwrap_or_else(|| generate_index_name(table, &index.columns, index.kind))
}

/// Explicit foreign key name, or the derived one
pub(crate) fn foreign_key_name(table: &str, foreign_key: &ForeignKey) -> String {
    foreign_key
        .name
        .clone()
        .unwrap_or_else(|| generate_foreign_key_name(table, &foreign_key.columns))
}

/// Comma-separated quoted column list
pub(crate) fn column_list<G: Grammar + ?Sized>(grammar: &G, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| grammar.wrap(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `FOREIGN KEY (..) REFERENCES t (c) ON DELETE .. ON UPDATE ..`
pub(crate) fn foreign_key_clause<G: Grammar + ?Sized>(grammar: &G, foreign_key: &ForeignKey) -> String {
    format!(
        "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
        column_list(grammar, &foreign_key.columns),
        grammar.wrap(&foreign_key.references_table),
        grammar.wrap(&foreign_key.references_column),
        foreign_key.on_delete,
        foreign_key.on_update
    )
}

/// Primary key column names for CREATE TABLE, column flags first
pub(crate) fn primary_key_names<'t>(table: &'t Table, include_auto_increment: bool) -> Vec<&'t str> {
    let mut names: Vec<&str> = table
        .primary_columns()
        .into_iter()
        .filter(|c| include_auto_increment || !c.auto_increment)
        .map(|c| c.name.as_str())
        .collect();
    for name in table.primary_index_columns() {
        let auto = table
            .columns
            .iter()
            .any(|c| c.name == name && c.auto_increment);
        if (include_auto_increment || !auto) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Assemble `CREATE TABLE [IF NOT EXISTS] name (\n  def,\n  def\n)`
pub(crate) fn create_table_body<G: Grammar + ?Sized>(grammar: &G, table: &Table, definitions: &[String]) -> String {
    let mut sql = String::from("CREATE TABLE ");
    if table.if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&grammar.wrap(&table.name));
    sql.push_str(" (\n");
    sql.push_str(
        &definitions
            .iter()
            .map(|d| format!("  {}", d))
            .collect::<Vec<_>>()
            .join(",\n"),
    );
    sql.push_str("\n)");
    sql
}

/// Validate a table name for the existence check
pub(crate) fn checked_table_name<G: Grammar + ?Sized>(grammar: &G, name: &str) -> MigrateResult<()> {
    validate_identifier(name, grammar.max_identifier_length())
}
