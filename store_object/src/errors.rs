use crate::id_type::KeyValue;
use cache_system::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    #[error("Concurrency conflict on {entity} with key {key}: {message}")]
    ConcurrencyConflict {
        entity: String,
        key: String,
        message: String,
    },

    #[error("Duplicate key {key} for {entity}")]
    DuplicateKey { entity: String, key: String },

    #[error("Unknown navigation '{path}' on {entity}")]
    UnknownNavigation { entity: String, path: String },

    #[error("Database error during {operation} on {entity}: {source}")]
    Database {
        entity: String,
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache error during {operation}: {source}")]
    Cache {
        operation: String,
        #[source]
        source: CacheError,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl RepositoryError {
    pub fn invalid_argument(argument: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.to_string(),
            message: message.into(),
        }
    }

    pub fn concurrency_conflict(entity: &str, key: &KeyValue, message: impl Into<String>) -> Self {
        Self::ConcurrencyConflict {
            entity: entity.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn duplicate_key(entity: &str, key: &KeyValue) -> Self {
        Self::DuplicateKey {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn unknown_navigation(entity: &str, path: &str) -> Self {
        Self::UnknownNavigation {
            entity: entity.to_string(),
            path: path.to_string(),
        }
    }

    pub fn database(entity: &str, operation: &str, source: sqlx::Error) -> Self {
        Self::Database {
            entity: entity.to_string(),
            operation: operation.to_string(),
            source,
        }
    }

    pub fn cache(operation: &str, source: CacheError) -> Self {
        Self::Cache {
            operation: operation.to_string(),
            source,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
