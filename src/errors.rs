//! Error types for the CacheHaus crate
//!
//! Wraps the member crates' errors for coordinator-level operations.

use cache_system::CacheError;
use config::ConfigError;
use store_object::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheHausError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Database connection error: {0}")]
    DatabaseConnection(#[from] sqlx::Error),

    #[error("No database configured; add a [database] section or call connect_database")]
    DatabaseNotConfigured,
}
