//! Table blueprint - fluent description of a CREATE or ALTER TABLE
//!
//! A `Table` is built fresh for each executor call, handed to a grammar and
//! then dropped. It performs no validation of its own.

use super::column::{Column, ColumnType};
use super::foreign::ForeignKey;
use super::index::{Index, IndexKind};

/// Table blueprint for CREATE and ALTER TABLE statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
    pub is_alter: bool,
    pub if_not_exists: bool,
    pub drop_columns: Vec<String>,
    pub drop_indexes: Vec<String>,
    pub drop_foreign_keys: Vec<String>,
    /// Column renames (old, new), compiled in insertion order
    pub rename_columns: Vec<(String, String)>,
    pub engine: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
}

impl Table {
    /// Describe a new table
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Describe a modification of an existing table
    pub fn alter(name: &str) -> Self {
        Self {
            is_alter: true,
            ..Self::new(name)
        }
    }

    /// Add a column of any type
    pub fn column(&mut self, name: &str, column_type: ColumnType) -> &mut Column {
        self.columns.push(Column::new(name, column_type));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing unsigned big integer primary key named `id`
    pub fn id(&mut self) -> &mut Column {
        self.column("id", ColumnType::BigInteger)
            .auto_increment()
            .unsigned()
            .primary()
    }

    /// VARCHAR column; a length of 0 uses the dialect default
    pub fn string(&mut self, name: &str, length: u32) -> &mut Column {
        self.column(name, ColumnType::String(length))
    }

    pub fn text(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Text)
    }

    pub fn tiny_integer(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::TinyInteger)
    }

    pub fn small_integer(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::SmallInteger)
    }

    pub fn integer(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::BigInteger)
    }

    pub fn float(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Float)
    }

    pub fn double(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Double)
    }

    pub fn decimal(&mut self, name: &str, precision: u32, scale: u32) -> &mut Column {
        self.column(name, ColumnType::Decimal { precision, scale })
    }

    pub fn boolean(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Boolean)
    }

    pub fn date(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Date)
    }

    pub fn date_time(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Timestamp)
    }

    pub fn time(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Time)
    }

    pub fn json(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Json)
    }

    pub fn binary(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Binary)
    }

    pub fn uuid(&mut self, name: &str) -> &mut Column {
        self.column(name, ColumnType::Uuid)
    }

    /// Nullable `created_at` and `updated_at` timestamps
    pub fn timestamps(&mut self) -> &mut Self {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
        self
    }

    /// Nullable `deleted_at` timestamp
    pub fn soft_deletes(&mut self) -> &mut Self {
        self.timestamp("deleted_at").nullable();
        self
    }

    fn push_index(&mut self, columns: &[&str], kind: IndexKind) -> &mut Index {
        let mut index = Index::new(columns);
        index.kind = kind;
        self.indexes.push(index);
        let last = self.indexes.len() - 1;
        &mut self.indexes[last]
    }

    pub fn index(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(columns, IndexKind::Plain)
    }

    pub fn unique(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(columns, IndexKind::Unique)
    }

    /// Composite primary key
    pub fn primary(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(columns, IndexKind::Primary)
    }

    pub fn fulltext(&mut self, columns: &[&str]) -> &mut Index {
        self.push_index(columns, IndexKind::Fulltext)
    }

    /// Foreign key on a single column
    pub fn foreign(&mut self, column: &str) -> &mut ForeignKey {
        self.foreign_columns(&[column])
    }

    /// Foreign key on several columns
    pub fn foreign_columns(&mut self, columns: &[&str]) -> &mut ForeignKey {
        self.foreign_keys.push(ForeignKey::new(columns));
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    pub fn drop_column(&mut self, name: &str) -> &mut Self {
        self.drop_columns.push(name.to_string());
        self
    }

    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        self.drop_indexes.push(name.to_string());
        self
    }

    pub fn drop_foreign(&mut self, name: &str) -> &mut Self {
        self.drop_foreign_keys.push(name.to_string());
        self
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> &mut Self {
        self.rename_columns.push((from.to_string(), to.to_string()));
        self
    }

    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    /// Storage engine (MySQL only)
    pub fn engine(&mut self, engine: &str) -> &mut Self {
        self.engine = Some(engine.to_string());
        self
    }

    /// Default character set (MySQL only)
    pub fn charset(&mut self, charset: &str) -> &mut Self {
        self.charset = Some(charset.to_string());
        self
    }

    /// Default collation (MySQL only)
    pub fn collation(&mut self, collation: &str) -> &mut Self {
        self.collation = Some(collation.to_string());
        self
    }

    /// Columns that belong to the primary key, in declaration order
    ///
    /// Column-level primary flags come first, then columns of any composite
    /// primary index that were not already flagged.
    pub fn primary_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary).collect()
    }

    /// Names from composite primary indexes not already flagged on a column
    pub fn primary_index_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for index in self.indexes.iter().filter(|i| i.kind == IndexKind::Primary) {
            for column in &index.columns {
                let flagged = self.columns.iter().any(|c| c.primary && &c.name == column);
                if !flagged && !names.contains(&column.as_str()) {
                    names.push(column);
                }
            }
        }
        names
    }
}
