//! # Configuration Management for CacheHaus
//!
//! This crate provides centralized configuration structures for all CacheHaus components:
//! the cache backend, the cached repository policy and the optional PostgreSQL data source.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{CacheBackendKind, CacheConfig, RepositoryConfig};
//!
//! let cache_config = CacheConfig::new(CacheBackendKind::Memory, 300, "school".to_string());
//! let repository_config = RepositoryConfig::default();
//! assert!(repository_config.fallback_on_cache_error);
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://localhost:6379"
//! default_ttl_seconds = 300
//! key_prefix = "school"
//! connection_timeout_ms = 3000
//!
//! [repository]
//! fallback_on_cache_error = true
//! single_flight = true
//!
//! [database]
//! host = "localhost"
//! port = 5432
//! database = "school"
//! username = "postgres"
//! password = "password"
//! min_connections = 1
//! max_connections = 10
//! connection_timeout_seconds = 30
//! idle_timeout_seconds = 600
//! max_lifetime_seconds = 3600
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from $CACHEHAUS_CONFIG or ./cachehaus.toml
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./cachehaus.toml";
const CONFIG_PATH_VAR: &str = "CACHEHAUS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Only needed when a PostgreSQL data source is used
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Which cache store backs the cached repositories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub redis_url: String,
    pub default_ttl_seconds: u64,
    pub key_prefix: String,
    pub connection_timeout_ms: u64,
}

/// Policy of the caching decorator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Serve reads straight from the data source when the cache backend fails
    pub fallback_on_cache_error: bool,
    /// Coalesce concurrent misses on the same key into one data source call
    pub single_flight: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

impl AppConfig {
    /// Load configuration from the TOML file named by `CACHEHAUS_CONFIG` or the default path
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err.into());
            }
        }

        if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::from_file(&config_path)
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            Err(ConfigError::Invalid(format!(
                "Config path must be specified in .env file as {} or in {} file",
                CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH
            )))
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;

        if let Some(database) = &self.database {
            database.validate()?;
        }

        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(backend: CacheBackendKind, default_ttl_seconds: u64, key_prefix: String) -> Self {
        Self {
            backend,
            default_ttl_seconds,
            key_prefix,
            ..Self::default()
        }
    }

    pub fn with_redis_url(mut self, redis_url: impl Into<String>) -> Self {
        self.redis_url = redis_url.into();
        self
    }

    pub fn with_connection_timeout(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    /// Get TTL as Duration
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Cache default_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.key_prefix.contains('*') || self.key_prefix.ends_with('.') {
            return Err(ConfigError::Invalid(format!(
                "Cache key_prefix '{}' must not contain '*' or end with '.'",
                self.key_prefix
            )));
        }
        if self.backend == CacheBackendKind::Redis {
            if self.redis_url.is_empty() {
                return Err(ConfigError::Invalid(
                    "Redis URL cannot be empty".to_string(),
                ));
            }
            if self.connection_timeout_ms == 0 {
                return Err(ConfigError::Invalid(
                    "Cache connection_timeout_ms must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            default_ttl_seconds: 300,
            key_prefix: "cachehaus".to_string(),
            connection_timeout_ms: 3000,
        }
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            fallback_on_cache_error: true,
            single_flight: true,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        min_connections: u32,
        max_connections: u32,
        connection_timeout_seconds: u64,
        idle_timeout_seconds: u64,
        max_lifetime_seconds: u64,
    ) -> Self {
        Self {
            host,
            port,
            database,
            username,
            password,
            min_connections,
            max_connections,
            connection_timeout_seconds,
            idle_timeout_seconds,
            max_lifetime_seconds,
        }
    }

    /// Build connection string
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid(
                "Database host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid(
                "Database port cannot be zero".to_string(),
            ));
        }
        if self.database.is_empty() {
            return Err(ConfigError::Invalid(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Invalid(
                "Database username cannot be empty".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::Invalid(
                "Database min_connections cannot be greater than max_connections".to_string(),
            ));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Database connection_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.cache.default_ttl_seconds, 300);
        assert_eq!(config.cache.key_prefix, "cachehaus");
        assert!(config.repository.fallback_on_cache_error);
        assert!(config.repository.single_flight);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_full_document() {
        let toml = r#"
            [cache]
            backend = "redis"
            redis_url = "redis://cache:6379"
            default_ttl_seconds = 60
            key_prefix = "school"
            connection_timeout_ms = 1500

            [repository]
            fallback_on_cache_error = false
            single_flight = false

            [database]
            host = "db"
            port = 5432
            database = "school"
            username = "postgres"
            password = "secret"
            min_connections = 1
            max_connections = 4
            connection_timeout_seconds = 10
            idle_timeout_seconds = 600
            max_lifetime_seconds = 0
        "#;

        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.cache.backend, CacheBackendKind::Redis);
        assert_eq!(config.cache.ttl_duration(), Duration::from_secs(60));
        assert_eq!(config.cache.connection_timeout(), Duration::from_millis(1500));
        assert!(!config.repository.fallback_on_cache_error);

        let database = config.database.unwrap();
        assert_eq!(
            database.connection_string(),
            "postgresql://postgres:secret@db:5432/school"
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = AppConfig::from_toml_str("[cache]\ndefault_ttl_seconds = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_prefix_with_wildcard_rejected() {
        let err = AppConfig::from_toml_str("[cache]\nkey_prefix = \"app*\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::from_toml_str("[cache]\nkey_prefix = \"app.\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = AppConfig::from_toml_str("[cache]\nbackend = \"memcached\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_invalid_database_section() {
        let toml = r#"
            [database]
            host = "db"
            port = 5432
            database = "school"
            username = "postgres"
            password = "secret"
            min_connections = 5
            max_connections = 2
            connection_timeout_seconds = 10
            idle_timeout_seconds = 600
            max_lifetime_seconds = 0
        "#;
        let err = AppConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("min_connections")));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nkey_prefix = \"from_file\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache.key_prefix, "from_file");
    }
}
