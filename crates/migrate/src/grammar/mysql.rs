//! MySQL grammar
//!
//! Backtick-quoted identifiers, inline KEY/CONSTRAINT definitions in CREATE
//! TABLE, table options (ENGINE, CHARSET, COLLATE) and positional ALTER.

use super::{
    checked_table_name, column_list, create_table_body, foreign_key_clause, foreign_key_name,
    index_name, primary_key_names, Grammar,
};
use crate::error::MigrateResult;
use crate::schema::{Column, ForeignKey, Index, IndexKind, Table};
use crate::security::escape_string;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl MySqlGrammar {
    pub fn new() -> Self {
        Self
    }

    fn compile_inline_index(&self, table: &str, index: &Index) -> String {
        let keyword = match index.kind {
            IndexKind::Unique => "UNIQUE KEY",
            IndexKind::Fulltext => "FULLTEXT KEY",
            IndexKind::Plain | IndexKind::Primary => "KEY",
        };
        format!(
            "{} {} ({})",
            keyword,
            self.wrap(&index_name(table, index)),
            column_list(self, &index.columns)
        )
    }

    fn table_options(table: &Table) -> String {
        let mut options = String::new();
        if let Some(engine) = &table.engine {
            options.push_str(&format!(" ENGINE={}", engine));
        }
        if let Some(charset) = &table.charset {
            options.push_str(&format!(" DEFAULT CHARSET={}", charset));
        }
        if let Some(collation) = &table.collation {
            options.push_str(&format!(" COLLATE={}", collation));
        }
        options
    }
}

impl Grammar for MySqlGrammar {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn max_identifier_length(&self) -> usize {
        64
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn supports_inline_indexes(&self) -> bool {
        true
    }

    fn compile_create(&self, table: &Table) -> String {
        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.compile_column(column))
            .collect();

        let primary = primary_key_names(table, true);
        if !primary.is_empty() {
            let names: Vec<String> = primary.iter().map(|n| n.to_string()).collect();
            definitions.push(format!("PRIMARY KEY ({})", column_list(self, &names)));
        }

        for index in table.indexes.iter().filter(|i| i.kind != IndexKind::Primary) {
            definitions.push(self.compile_inline_index(&table.name, index));
        }

        for foreign_key in &table.foreign_keys {
            definitions.push(format!(
                "CONSTRAINT {} {}",
                self.wrap(&foreign_key_name(&table.name, foreign_key)),
                foreign_key_clause(self, foreign_key)
            ));
        }

        let mut sql = create_table_body(self, table, &definitions);
        sql.push_str(&Self::table_options(table));
        sql
    }

    fn compile_alter(&self, table: &Table) -> Vec<String> {
        let wrapped = self.wrap(&table.name);
        let mut statements = Vec::new();

        statements.extend(
            table
                .drop_foreign_keys
                .iter()
                .filter_map(|name| self.compile_drop_foreign_key(&table.name, name)),
        );
        statements.extend(
            table
                .drop_indexes
                .iter()
                .map(|name| self.compile_drop_index(&table.name, name)),
        );
        for column in &table.drop_columns {
            statements.push(format!("ALTER TABLE {} DROP COLUMN {}", wrapped, self.wrap(column)));
        }
        for (from, to) in &table.rename_columns {
            statements.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                wrapped,
                self.wrap(from),
                self.wrap(to)
            ));
        }
        for column in &table.columns {
            let verb = if column.is_change() { "MODIFY COLUMN" } else { "ADD COLUMN" };
            let mut statement = format!("ALTER TABLE {} {} {}", wrapped, verb, self.compile_column(column));
            if let Some(after) = &column.after {
                statement.push_str(&format!(" AFTER {}", self.wrap(after)));
            }
            statements.push(statement);
        }
        statements.extend(table.indexes.iter().map(|index| self.compile_index(&table.name, index)));
        statements.extend(
            table
                .foreign_keys
                .iter()
                .filter_map(|fk| self.compile_foreign_key(&table.name, fk)),
        );

        statements
    }

    fn compile_rename(&self, from: &str, to: &str) -> String {
        format!("RENAME TABLE {} TO {}", self.wrap(from), self.wrap(to))
    }

    fn compile_has_table(&self, name: &str) -> MigrateResult<String> {
        checked_table_name(self, name)?;
        Ok(format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = '{}'",
            name
        ))
    }

    fn type_string(&self, length: u32) -> String {
        let length = if length == 0 { 255 } else { length };
        format!("VARCHAR({})", length)
    }

    fn type_text(&self) -> String {
        "TEXT".to_string()
    }

    fn type_tiny_integer(&self) -> String {
        "TINYINT".to_string()
    }

    fn type_small_integer(&self) -> String {
        "SMALLINT".to_string()
    }

    fn type_integer(&self) -> String {
        "INT".to_string()
    }

    fn type_big_integer(&self) -> String {
        "BIGINT".to_string()
    }

    fn type_float(&self) -> String {
        "FLOAT".to_string()
    }

    fn type_double(&self) -> String {
        "DOUBLE".to_string()
    }

    fn type_decimal(&self, precision: u32, scale: u32) -> String {
        format!("DECIMAL({},{})", precision, scale)
    }

    fn type_boolean(&self) -> String {
        "TINYINT(1)".to_string()
    }

    fn type_date(&self) -> String {
        "DATE".to_string()
    }

    fn type_date_time(&self) -> String {
        "DATETIME".to_string()
    }

    fn type_timestamp(&self) -> String {
        "TIMESTAMP".to_string()
    }

    fn type_time(&self) -> String {
        "TIME".to_string()
    }

    fn type_json(&self) -> String {
        "JSON".to_string()
    }

    fn type_binary(&self) -> String {
        "BLOB".to_string()
    }

    fn type_uuid(&self) -> String {
        "CHAR(36)".to_string()
    }

    fn compile_column(&self, column: &Column) -> String {
        let mut sql = format!("{} {}", self.wrap(&column.name), self.column_type(column));

        if column.unsigned && column.column_type.is_numeric() {
            sql.push_str(" UNSIGNED");
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.format_default(default));
        }
        if column.auto_increment {
            sql.push_str(" AUTO_INCREMENT");
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(comment) = &column.comment {
            sql.push_str(&format!(" COMMENT '{}'", escape_string(comment)));
        }
        sql
    }

    fn compile_index(&self, table: &str, index: &Index) -> String {
        let columns = column_list(self, &index.columns);
        let kind = match index.kind {
            IndexKind::Primary => {
                return format!("ALTER TABLE {} ADD PRIMARY KEY ({})", self.wrap(table), columns)
            }
            IndexKind::Unique => "UNIQUE INDEX",
            IndexKind::Fulltext => "FULLTEXT INDEX",
            IndexKind::Plain => "INDEX",
        };
        format!(
            "CREATE {} {} ON {} ({})",
            kind,
            self.wrap(&index_name(table, index)),
            self.wrap(table),
            columns
        )
    }

    fn compile_drop_index(&self, table: &str, name: &str) -> String {
        format!("ALTER TABLE {} DROP INDEX {}", self.wrap(table), self.wrap(name))
    }

    fn compile_foreign_key(&self, table: &str, foreign_key: &ForeignKey) -> Option<String> {
        Some(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {}",
            self.wrap(table),
            self.wrap(&foreign_key_name(table, foreign_key)),
            foreign_key_clause(self, foreign_key)
        ))
    }

    fn compile_drop_foreign_key(&self, table: &str, name: &str) -> Option<String> {
        Some(format!("ALTER TABLE {} DROP FOREIGN KEY {}", self.wrap(table), self.wrap(name)))
    }

    fn compile_create_migrations_table(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  id INT UNSIGNED AUTO_INCREMENT PRIMARY KEY,\n  migration VARCHAR(255) NOT NULL,\n  batch INT NOT NULL,\n  executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n)",
            self.wrap(table)
        )
    }
}
