//! Driver Registry - backend name to driver constructor
//!
//! An explicit object rather than process-global state: build one at startup,
//! register drivers once, then share it (it is `Send + Sync`) between migrators.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::core::Driver;
use super::postgres::PostgresDriver;
use crate::error::{MigrateError, MigrateResult};

/// Constructor for a driver instance
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Thread-safe registry of database drivers
#[derive(Default)]
pub struct DriverRegistry {
    factories: RwLock<HashMap<String, DriverFactory>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers())
            .finish()
    }
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in drivers
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("postgres", || Box::new(PostgresDriver::new()));
        registry
    }

    /// Register a driver constructor under `name`
    ///
    /// # Panics
    ///
    /// Registering the same name twice is a programming error and panics.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        if factories.contains_key(name) {
            panic!("driver '{}' is already registered", name);
        }
        factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Construct the driver registered under `name`
    pub fn get(&self, name: &str) -> MigrateResult<Box<dyn Driver>> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
            factories
                .get(name)
                .cloned()
                .ok_or_else(|| MigrateError::UnknownBackend(name.to_string()))?
        };
        Ok(factory())
    }

    /// Whether a driver is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories.contains_key(name)
    }

    /// Registered driver names, sorted
    pub fn drivers(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }
}
