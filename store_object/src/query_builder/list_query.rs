//! List query builder
//!
//! Bundles the optional predicate and the include list shared by every read.

use crate::errors::RepositoryError;
use crate::query_builder::filter::Predicate;
use crate::query_builder::includes::Includes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    predicate: Option<Predicate>,
    includes: Includes,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filtered(predicate: Predicate) -> Self {
        Self::new().filter(predicate)
    }

    /// Add a condition; repeated calls are AND-combined
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and_also(predicate),
            None => predicate,
        });
        self
    }

    pub fn include(mut self, path: &str) -> Self {
        self.includes.push(path);
        self
    }

    pub fn with_includes(mut self, includes: Includes) -> Self {
        self.includes = includes;
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn includes(&self) -> &Includes {
        &self.includes
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if let Some(predicate) = &self.predicate {
            predicate.validate()?;
        }
        self.includes.validate()
    }

    /// Like `validate`, additionally requiring a predicate
    pub fn validate_with_predicate(&self) -> Result<(), RepositoryError> {
        if self.predicate.is_none() {
            return Err(RepositoryError::invalid_argument(
                "predicate",
                "a predicate is required",
            ));
        }
        self.validate()
    }
}
