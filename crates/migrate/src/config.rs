//! Migration and connection configuration
//!
//! Loading a configuration file is left to the application; these types can be
//! deserialized from whatever format it uses, built from environment variables
//! or parsed from a database URL.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::backends::BackendType;
use crate::error::{MigrateError, MigrateResult};
use crate::security::validate_identifier;

/// Default history table name
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Migrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// History table name
    pub table: String,
    /// Record SQL instead of executing it
    pub dry_run: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            dry_run: false,
        }
    }
}

impl MigrationConfig {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build from `MIGRATE_TABLE` and `MIGRATE_DRY_RUN`, falling back to defaults
    pub fn from_env() -> MigrateResult<Self> {
        let table = env::var("MIGRATE_TABLE").unwrap_or_else(|_| DEFAULT_MIGRATIONS_TABLE.to_string());

        let dry_run = match env::var("MIGRATE_DRY_RUN") {
            Ok(value) => parse_bool(&value).ok_or_else(|| {
                MigrateError::Configuration(format!(
                    "MIGRATE_DRY_RUN must be true or false, got '{}'",
                    value
                ))
            })?,
            Err(_) => false,
        };

        let config = Self { table, dry_run };
        config.validate()?;
        Ok(config)
    }

    /// The history table name is interpolated into SQL, so it must be a safe identifier
    pub fn validate(&self) -> MigrateResult<()> {
        validate_identifier(&self.table, 63).map_err(|e| {
            MigrateError::Configuration(format!("Invalid migrations table name: {}", e))
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Connection settings handed to a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    /// Database name, or the file path for SQLite
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
    /// Extra driver parameters, passed through as URL query pairs
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Parse a database URL (`postgres://`, `postgresql://`, `mysql://`, `sqlite://`)
    pub fn from_url(database_url: &str) -> MigrateResult<Self> {
        let scheme = database_url
            .split(':')
            .next()
            .unwrap_or_default();
        let backend: BackendType = scheme
            .parse()
            .map_err(MigrateError::Configuration)?;
        let driver = backend.to_string();

        if backend == BackendType::SQLite {
            let path = database_url
                .trim_start_matches(scheme)
                .trim_start_matches(':')
                .trim_start_matches("//");
            if path.is_empty() {
                return Err(MigrateError::Configuration(
                    "Missing database path in SQLite URL".to_string(),
                ));
            }
            return Ok(Self {
                driver,
                database: path.to_string(),
                ..Default::default()
            });
        }

        let parsed = url::Url::parse(database_url)
            .map_err(|e| MigrateError::Configuration(format!("Invalid database URL: {}", e)))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| MigrateError::Configuration("Missing host in database URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(MigrateError::Configuration(
                "Missing database name in URL".to_string(),
            ));
        }

        let username = if parsed.username().is_empty() {
            None
        } else {
            Some(parsed.username().to_string())
        };

        let mut options: HashMap<String, String> = parsed
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let charset = options.remove("charset");

        Ok(Self {
            port: parsed.port().unwrap_or_else(|| default_port(&driver)),
            driver,
            host,
            database,
            username,
            password: parsed.password().map(|p| p.to_string()),
            charset,
            options,
        })
    }

    /// Render the settings back into a database URL
    pub fn to_url(&self) -> MigrateResult<String> {
        let backend: BackendType = self
            .driver
            .parse()
            .map_err(MigrateError::Configuration)?;

        if backend == BackendType::SQLite {
            return Ok(format!("sqlite://{}", self.database));
        }

        let invalid = |what: &str| MigrateError::Configuration(format!("Invalid {} in connection config", what));

        let mut url = url::Url::parse(&format!("{}://{}", backend, self.host))
            .map_err(|e| MigrateError::Configuration(format!("Invalid database URL: {}", e)))?;
        let port = if self.port == 0 { default_port(&self.driver) } else { self.port };
        url.set_port(Some(port)).map_err(|_| invalid("port"))?;
        if let Some(username) = &self.username {
            url.set_username(username).map_err(|_| invalid("username"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password)).map_err(|_| invalid("password"))?;
        }
        url.set_path(&self.database);

        let mut pairs: Vec<(&String, &String)> = self.options.iter().collect();
        pairs.sort();
        if self.charset.is_some() || !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            if let Some(charset) = &self.charset {
                query.append_pair("charset", charset);
            }
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    /// Pool size from the `max_connections` option
    pub fn max_connections(&self) -> u32 {
        self.options
            .get("max_connections")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }
}

/// Default port for a driver name; 0 for file-based backends
pub fn default_port(driver: &str) -> u16 {
    match driver.parse::<BackendType>() {
        Ok(BackendType::MySQL) => 3306,
        Ok(BackendType::PostgreSQL) => 5432,
        _ => 0,
    }
}
