//! Migration System
//!
//! Migration definitions, the schema executor handed to migration bodies,
//! history persistence and the migrator itself.

pub mod definitions;
pub mod executor;
pub mod history;
pub mod rollback;
pub mod runner;

pub use definitions::*;
pub use executor::{ExecutionMode, Executor};
pub use history::MigrationHistory;
pub use rollback::MigrationRollback;
pub use runner::Migrator;
