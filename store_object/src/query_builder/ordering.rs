//! Sort specifications

use crate::errors::RepositoryError;
use crate::validation::ValidatedFieldPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One `field direction` pair of an ORDER BY
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: &str) -> Self {
        Self::new(field, SortDirection::Desc)
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        ValidatedFieldPath::new(&self.field)
            .map(|_| ())
            .map_err(|e| RepositoryError::invalid_argument("sort", format!("field '{}': {}", self.field, e)))
    }

    pub fn key_token(&self) -> String {
        format!("{}:{}", self.field, self.direction.token())
    }
}
