//! Column definitions

use std::fmt;

/// Logical column types, independent of any dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Variable-length string with a maximum length (0 means dialect default)
    String(u32),
    Text,
    TinyInteger,
    SmallInteger,
    Integer,
    BigInteger,
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Boolean,
    Date,
    DateTime,
    Timestamp,
    Time,
    Json,
    Binary,
    Uuid,
}

impl ColumnType {
    /// Numeric types accept the unsigned modifier
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyInteger
                | ColumnType::SmallInteger
                | ColumnType::Integer
                | ColumnType::BigInteger
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::Decimal { .. }
        )
    }
}

/// Typed default value for a column
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Rendered verbatim, e.g. `CURRENT_TIMESTAMP`
    Expression(String),
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        DefaultValue::Bool(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        DefaultValue::Integer(value as i64)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        DefaultValue::Integer(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        DefaultValue::Float(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        DefaultValue::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        DefaultValue::String(value)
    }
}

impl<T> From<Option<T>> for DefaultValue
where
    T: Into<DefaultValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DefaultValue::Null,
        }
    }
}

/// Whether a column definition appends a new column or redefines an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnAction {
    #[default]
    Add,
    Modify,
}

impl fmt::Display for ColumnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnAction::Add => write!(f, "add"),
            ColumnAction::Modify => write!(f, "modify"),
        }
    }
}

/// A single column declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub unsigned: bool,
    pub auto_increment: bool,
    pub primary: bool,
    pub unique: bool,
    pub comment: Option<String>,
    /// Positional hint, honored only by dialects with positional ALTER
    pub after: Option<String>,
    pub action: ColumnAction,
}

impl Column {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable: false,
            default: None,
            unsigned: false,
            auto_increment: false,
            primary: false,
            unique: false,
            comment: None,
            after: None,
            action: ColumnAction::Add,
        }
    }

    /// Allow NULL values
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Set the default value
    pub fn default(&mut self, value: impl Into<DefaultValue>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    /// Default to `NULL`
    pub fn default_null(&mut self) -> &mut Self {
        self.default = Some(DefaultValue::Null);
        self
    }

    /// Default to a raw SQL expression
    pub fn default_expression(&mut self, expression: &str) -> &mut Self {
        self.default = Some(DefaultValue::Expression(expression.to_string()));
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.comment = Some(text.to_string());
        self
    }

    /// Place this column after another one (MySQL only)
    pub fn after(&mut self, column: &str) -> &mut Self {
        self.after = Some(column.to_string());
        self
    }

    /// Redefine an existing column instead of appending a new one
    ///
    /// The column must already exist in the live schema; nothing here checks it.
    pub fn change(&mut self) -> &mut Self {
        self.action = ColumnAction::Modify;
        self
    }

    pub fn is_change(&self) -> bool {
        self.action == ColumnAction::Modify
    }
}
