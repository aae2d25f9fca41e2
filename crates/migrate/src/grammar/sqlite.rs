//! SQLite grammar
//!
//! SQLite maps every logical type onto a storage affinity and only supports
//! renames, added columns and new indexes through ALTER. Everything else in an
//! ALTER blueprint is left out of the compiled statements and reported by
//! [`Grammar::unsupported_alter_operations`].

use super::{
    checked_table_name, column_list, create_table_body, foreign_key_clause, foreign_key_name,
    index_name, primary_key_names, Grammar,
};
use crate::error::MigrateResult;
use crate::schema::{Column, ForeignKey, Index, IndexKind, Table};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl SqliteGrammar {
    pub fn new() -> Self {
        Self
    }
}

impl Grammar for SqliteGrammar {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn max_identifier_length(&self) -> usize {
        128
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn compile_create(&self, table: &Table) -> String {
        // AUTOINCREMENT only works on a lone INTEGER PRIMARY KEY, so a composite
        // key demotes the counter to a plain key column
        let composite = !primary_key_names(table, false).is_empty();
        let primary = primary_key_names(table, true);

        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                if composite && column.auto_increment && primary.contains(&column.name.as_str()) {
                    format!("{} INTEGER NOT NULL", self.wrap(&column.name))
                } else {
                    self.compile_column(column)
                }
            })
            .collect();

        if composite {
            let names: Vec<String> = primary.iter().map(|n| n.to_string()).collect();
            definitions.push(format!("PRIMARY KEY ({})", column_list(self, &names)));
        }

        // foreign keys can only be declared here, never added later
        for foreign_key in &table.foreign_keys {
            definitions.push(format!(
                "CONSTRAINT {} {}",
                self.wrap(&foreign_key_name(&table.name, foreign_key)),
                foreign_key_clause(self, foreign_key)
            ));
        }

        create_table_body(self, table, &definitions)
    }

    fn compile_alter(&self, table: &Table) -> Vec<String> {
        let wrapped = self.wrap(&table.name);
        let mut statements = Vec::new();

        for (from, to) in &table.rename_columns {
            statements.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                wrapped,
                self.wrap(from),
                self.wrap(to)
            ));
        }
        for column in table.columns.iter().filter(|c| !c.is_change()) {
            statements.push(format!("ALTER TABLE {} ADD COLUMN {}", wrapped, self.compile_column(column)));
        }
        statements.extend(
            table
                .indexes
                .iter()
                .filter(|index| index.kind != IndexKind::Primary)
                .map(|index| self.compile_index(&table.name, index)),
        );

        statements
    }

    fn unsupported_alter_operations(&self, table: &Table) -> Vec<String> {
        let mut operations = Vec::new();
        for name in &table.drop_foreign_keys {
            operations.push(format!("drop foreign key '{}'", name));
        }
        for name in &table.drop_indexes {
            operations.push(format!("drop index '{}'", name));
        }
        for name in &table.drop_columns {
            operations.push(format!("drop column '{}'", name));
        }
        for column in table.columns.iter().filter(|c| c.is_change()) {
            operations.push(format!("modify column '{}'", column.name));
        }
        for index in table.indexes.iter().filter(|i| i.kind == IndexKind::Primary) {
            operations.push(format!("add primary key ({})", index.columns.join(", ")));
        }
        for foreign_key in &table.foreign_keys {
            operations.push(format!(
                "add foreign key '{}'",
                foreign_key_name(&table.name, foreign_key)
            ));
        }
        operations
    }

    fn compile_has_table(&self, name: &str) -> MigrateResult<String> {
        checked_table_name(self, name)?;
        Ok(format!(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='{}'",
            name
        ))
    }

    fn type_string(&self, _length: u32) -> String {
        "TEXT".to_string()
    }

    fn type_text(&self) -> String {
        "TEXT".to_string()
    }

    fn type_tiny_integer(&self) -> String {
        "INTEGER".to_string()
    }

    fn type_small_integer(&self) -> String {
        "INTEGER".to_string()
    }

    fn type_integer(&self) -> String {
        "INTEGER".to_string()
    }

    fn type_big_integer(&self) -> String {
        "INTEGER".to_string()
    }

    fn type_float(&self) -> String {
        "REAL".to_string()
    }

    fn type_double(&self) -> String {
        "REAL".to_string()
    }

    fn type_decimal(&self, _precision: u32, _scale: u32) -> String {
        "REAL".to_string()
    }

    fn type_boolean(&self) -> String {
        "INTEGER".to_string()
    }

    fn type_date(&self) -> String {
        "TEXT".to_string()
    }

    fn type_date_time(&self) -> String {
        "TEXT".to_string()
    }

    fn type_timestamp(&self) -> String {
        "TEXT".to_string()
    }

    fn type_time(&self) -> String {
        "TEXT".to_string()
    }

    fn type_json(&self) -> String {
        "TEXT".to_string()
    }

    fn type_binary(&self) -> String {
        "BLOB".to_string()
    }

    fn type_uuid(&self) -> String {
        "TEXT".to_string()
    }

    fn compile_column(&self, column: &Column) -> String {
        let mut sql = self.wrap(&column.name);

        if column.auto_increment {
            sql.push_str(" INTEGER PRIMARY KEY AUTOINCREMENT");
            return sql;
        }

        sql.push(' ');
        sql.push_str(&self.column_type(column));
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.format_default(default));
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        sql
    }

    fn compile_index(&self, table: &str, index: &Index) -> String {
        // primary keys cannot be added after creation; a unique index is the closest match
        let unique = matches!(index.kind, IndexKind::Unique | IndexKind::Primary);
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.wrap(&index_name(table, index)),
            self.wrap(table),
            column_list(self, &index.columns)
        )
    }

    fn compile_drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.wrap(name))
    }

    fn compile_foreign_key(&self, _table: &str, _foreign_key: &ForeignKey) -> Option<String> {
        None
    }

    fn compile_drop_foreign_key(&self, _table: &str, _name: &str) -> Option<String> {
        None
    }

    fn compile_create_migrations_table(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  id INTEGER PRIMARY KEY AUTOINCREMENT,\n  migration TEXT NOT NULL,\n  batch INTEGER NOT NULL,\n  executed_at TEXT DEFAULT CURRENT_TIMESTAMP\n)",
            self.wrap(table)
        )
    }
}
