//! Schema Model
//!
//! Dialect-neutral description of a table transformation: columns, indexes and
//! foreign keys for a CREATE, plus drops and renames for an ALTER.

pub mod column;
pub mod foreign;
pub mod index;
pub mod table;

pub use column::{Column, ColumnAction, ColumnType, DefaultValue};
pub use foreign::{ForeignKey, ForeignKeyAction};
pub use index::{Index, IndexKind};
pub use table::Table;
