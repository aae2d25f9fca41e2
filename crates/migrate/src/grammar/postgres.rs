//! PostgreSQL grammar
//!
//! Identifiers are double-quoted. Auto-increment columns become SERIAL types
//! carrying their own PRIMARY KEY, indexes are created after the table, and
//! foreign keys are declared inline.

use super::{
    checked_table_name, column_list, create_table_body, foreign_key_clause, foreign_key_name,
    index_name, primary_key_names, Grammar,
};
use crate::error::MigrateResult;
use crate::schema::{Column, ColumnType, ForeignKey, Index, IndexKind, Table};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl PostgresGrammar {
    pub fn new() -> Self {
        Self
    }

    fn serial_type(column: &Column) -> &'static str {
        match column.column_type {
            ColumnType::BigInteger => "BIGSERIAL",
            ColumnType::SmallInteger | ColumnType::TinyInteger => "SMALLSERIAL",
            _ => "SERIAL",
        }
    }

    fn serial_column(&self, column: &Column) -> String {
        format!("{} {}", self.wrap(&column.name), Self::serial_type(column))
    }

    fn compile_change(&self, table: &str, column: &Column) -> Vec<String> {
        let prefix = format!("ALTER TABLE {} ALTER COLUMN {}", self.wrap(table), self.wrap(&column.name));
        let mut statements = vec![format!("{} TYPE {}", prefix, self.column_type(column))];
        if column.nullable {
            statements.push(format!("{} DROP NOT NULL", prefix));
        } else {
            statements.push(format!("{} SET NOT NULL", prefix));
        }
        if let Some(default) = &column.default {
            statements.push(format!("{} SET DEFAULT {}", prefix, self.format_default(default)));
        }
        statements
    }
}

impl Grammar for PostgresGrammar {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn max_identifier_length(&self) -> usize {
        63
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn compile_create(&self, table: &Table) -> String {
        // a composite key absorbs any serial key column; only one PRIMARY KEY may exist
        let composite = !primary_key_names(table, false).is_empty();
        let primary = primary_key_names(table, true);

        let mut definitions: Vec<String> = table
            .columns
            .iter()
            .map(|column| {
                if composite && column.auto_increment && primary.contains(&column.name.as_str()) {
                    self.serial_column(column)
                } else {
                    self.compile_column(column)
                }
            })
            .collect();

        if composite {
            let names: Vec<String> = primary.iter().map(|n| n.to_string()).collect();
            definitions.push(format!("PRIMARY KEY ({})", column_list(self, &names)));
        }

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
            if column.is_change() {
                statements.extend(self.compile_change(&table.name, column));
            } else {
                statements.push(format!("ALTER TABLE {} ADD COLUMN {}", wrapped, self.compile_column(column)));
            }
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

    fn compile_has_table(&self, name: &str) -> MigrateResult<String> {
        checked_table_name(self, name)?;
        Ok(format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public' AND table_name = '{}'",
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
        // no TINYINT
        "SMALLINT".to_string()
    }

    fn type_small_integer(&self) -> String {
        "SMALLINT".to_string()
    }

    fn type_integer(&self) -> String {
        "INTEGER".to_string()
    }

    fn type_big_integer(&self) -> String {
        "BIGINT".to_string()
    }

    fn type_float(&self) -> String {
        "REAL".to_string()
    }

    fn type_double(&self) -> String {
        "DOUBLE PRECISION".to_string()
    }

    fn type_decimal(&self, precision: u32, scale: u32) -> String {
        format!("DECIMAL({},{})", precision, scale)
    }

    fn type_boolean(&self) -> String {
        "BOOLEAN".to_string()
    }

    fn type_date(&self) -> String {
        "DATE".to_string()
    }

    fn type_date_time(&self) -> String {
        "TIMESTAMP".to_string()
    }

    fn type_timestamp(&self) -> String {
        "TIMESTAMP".to_string()
    }

    fn type_time(&self) -> String {
        "TIME".to_string()
    }

    fn type_json(&self) -> String {
        "JSONB".to_string()
    }

    fn type_binary(&self) -> String {
        "BYTEA".to_string()
    }

    fn type_uuid(&self) -> String {
        "UUID".to_string()
    }

    fn compile_column(&self, column: &Column) -> String {
        if column.auto_increment {
            return format!("{} PRIMARY KEY", self.serial_column(column));
        }

        let mut sql = self.wrap(&column.name);
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
        let columns = column_list(self, &index.columns);
        match index.kind {
            IndexKind::Primary => format!("ALTER TABLE {} ADD PRIMARY KEY ({})", self.wrap(table), columns),
            IndexKind::Unique => format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                self.wrap(&index_name(table, index)),
                self.wrap(table),
                columns
            ),
            // FULLTEXT degrades to a plain btree index
            IndexKind::Plain | IndexKind::Fulltext => format!(
                "CREATE INDEX {} ON {} ({})",
                self.wrap(&index_name(table, index)),
                self.wrap(table),
                columns
            ),
        }
    }

    fn compile_drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.wrap(name))
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
        Some(format!("ALTER TABLE {} DROP CONSTRAINT {}", self.wrap(table), self.wrap(name)))
    }

    fn compile_create_migrations_table(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  id SERIAL PRIMARY KEY,\n  migration VARCHAR(255) NOT NULL,\n  batch INTEGER NOT NULL,\n  executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n)",
            self.wrap(table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrateError;

    fn grammar() -> PostgresGrammar {
        PostgresGrammar::new()
    }

    #[test]
    fn test_create_table() {
        let mut table = Table::new("users");
        table.id();
        table.string("email", 0).unique();
        table.string("name", 100).nullable();
        table.boolean("active").default(true);
        table.timestamps();

        let sql = grammar().compile_create(&table);
        assert_eq!(
            sql,
            "CREATE TABLE \"users\" (\n  \"id\" BIGSERIAL PRIMARY KEY,\n  \"email\" VARCHAR(255) NOT NULL UNIQUE,\n  \"name\" VARCHAR(100),\n  \"active\" BOOLEAN NOT NULL DEFAULT TRUE,\n  \"created_at\" TIMESTAMP,\n  \"updated_at\" TIMESTAMP\n)"
        );
    }

    #[test]
    fn test_create_with_composite_primary_and_foreign_key() {
        let mut table = Table::new("memberships");
        table.if_not_exists();
        table.big_integer("team_id").primary();
        table.big_integer("user_id").primary();
        table.foreign("user_id").references("users", "id").cascade_on_delete();

        let sql = grammar().compile_create(&table);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"memberships\" ("));
        assert!(sql.contains("  PRIMARY KEY (\"team_id\", \"user_id\")"));
        assert!(sql.contains(
            "CONSTRAINT \"memberships_user_id_fk\" FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE ON UPDATE RESTRICT"
        ));
    }

    #[test]
    fn test_composite_primary_absorbs_serial_column() {
        let mut table = Table::new("events");
        table.id();
        table.date("day").primary();
        table.string("kind", 40);

        let sql = grammar().compile_create(&table);
        assert_eq!(
            sql,
            "CREATE TABLE \"events\" (\n  \"id\" BIGSERIAL,\n  \"day\" DATE NOT NULL,\n  \"kind\" VARCHAR(40) NOT NULL,\n  PRIMARY KEY (\"id\", \"day\")\n)"
        );
        assert_eq!(sql.matches("PRIMARY KEY").count(), 1);
    }

    #[test]
    fn test_indexes_are_deferred() {
        let mut table = Table::new("posts");
        table.id();
        table.string("slug", 120);
        table.text("body");
        table.unique(&["slug"]);
        table.fulltext(&["body"]);

        let statements = grammar().compile_create_statements(&table);
        assert_eq!(statements.len(), 3);
        assert!(!statements[0].contains("INDEX"));
        assert_eq!(
            statements[1],
            "CREATE UNIQUE INDEX \"posts_slug_unique\" ON \"posts\" (\"slug\")"
        );
        assert_eq!(
            statements[2],
            "CREATE INDEX \"posts_body_fulltext\" ON \"posts\" (\"body\")"
        );
    }

    #[test]
    fn test_type_mapping() {
        let g = grammar();
        assert_eq!(g.type_tiny_integer(), "SMALLINT");
        assert_eq!(g.type_float(), "REAL");
        assert_eq!(g.type_double(), "DOUBLE PRECISION");
        assert_eq!(g.type_decimal(10, 2), "DECIMAL(10,2)");
        assert_eq!(g.type_json(), "JSONB");
        assert_eq!(g.type_binary(), "BYTEA");
        assert_eq!(g.type_uuid(), "UUID");
        assert_eq!(g.type_date_time(), "TIMESTAMP");
    }

    #[test]
    fn test_column_fragments() {
        let g = grammar();
        let mut col = Column::new("qty", ColumnType::SmallInteger);
        col.unsigned().comment("ignored").default(0);
        assert_eq!(g.compile_column(&col), "\"qty\" SMALLINT NOT NULL DEFAULT 0");

        let mut serial = Column::new("id", ColumnType::Integer);
        serial.auto_increment().nullable();
        assert_eq!(g.compile_column(&serial), "\"id\" SERIAL PRIMARY KEY");

        let mut quoted = Column::new("title", ColumnType::String(20));
        quoted.default("it's");
        assert_eq!(
            g.compile_column(&quoted),
            "\"title\" VARCHAR(20) NOT NULL DEFAULT 'it''s'"
        );
    }

    #[test]
    fn test_alter_statement_order() {
        let mut table = Table::alter("users");
        table.string("nickname", 50).nullable();
        table.string("email", 320).change().default("none");
        table.index(&["nickname"]);
        table.foreign("team_id").references("teams", "id");
        table.rename_column("fullname", "name");
        table.drop_column("legacy");
        table.drop_index("users_old_idx");
        table.drop_foreign("users_org_id_fk");

        let statements = grammar().compile_alter(&table);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE \"users\" DROP CONSTRAINT \"users_org_id_fk\"",
                "DROP INDEX \"users_old_idx\"",
                "ALTER TABLE \"users\" DROP COLUMN \"legacy\"",
                "ALTER TABLE \"users\" RENAME COLUMN \"fullname\" TO \"name\"",
                "ALTER TABLE \"users\" ADD COLUMN \"nickname\" VARCHAR(50)",
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" TYPE VARCHAR(320)",
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" SET NOT NULL",
                "ALTER TABLE \"users\" ALTER COLUMN \"email\" SET DEFAULT 'none'",
                "CREATE INDEX \"users_nickname_idx\" ON \"users\" (\"nickname\")",
                "ALTER TABLE \"users\" ADD CONSTRAINT \"users_team_id_fk\" FOREIGN KEY (\"team_id\") REFERENCES \"teams\" (\"id\") ON DELETE RESTRICT ON UPDATE RESTRICT",
            ]
        );
        assert!(grammar().unsupported_alter_operations(&table).is_empty());
    }

    #[test]
    fn test_drop_and_rename() {
        let g = grammar();
        assert_eq!(g.compile_drop("users"), "DROP TABLE \"users\"");
        assert_eq!(g.compile_drop_if_exists("users"), "DROP TABLE IF EXISTS \"users\"");
        assert_eq!(g.compile_rename("users", "people"), "ALTER TABLE \"users\" RENAME TO \"people\"");
    }

    #[test]
    fn test_has_table() {
        let sql = grammar().compile_has_table("users").unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'public' AND table_name = 'users'"
        );

        let err = grammar()
            .compile_has_table("users'; DROP TABLE users; --")
            .unwrap_err();
        assert!(matches!(err, MigrateError::InvalidIdentifier { .. }));
        assert!(grammar().compile_has_table(&"t".repeat(64)).is_err());
        assert!(grammar().compile_has_table(&"t".repeat(63)).is_ok());
    }

    #[test]
    fn test_history_statements() {
        let g = grammar();
        assert!(g
            .compile_create_migrations_table("migrations")
            .starts_with("CREATE TABLE IF NOT EXISTS \"migrations\""));
        assert_eq!(
            g.compile_insert_migration("migrations"),
            "INSERT INTO \"migrations\" (migration, batch) VALUES ($1, $2)"
        );
        assert_eq!(
            g.compile_delete_migration("migrations"),
            "DELETE FROM \"migrations\" WHERE migration = $1"
        );
        assert_eq!(
            g.compile_get_last_batch("migrations"),
            "SELECT COALESCE(MAX(batch), 0) FROM \"migrations\""
        );
    }
}
