//! Navigation include lists

use crate::errors::RepositoryError;
use crate::validation::ValidatedFieldPath;
use serde::{Deserialize, Serialize};

/// Navigation paths to load alongside the root entity; order carries no meaning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Includes(Vec<String>);

impl Includes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str) -> Self {
        self.0.push(path.to_string());
        self
    }

    pub fn push(&mut self, path: &str) {
        self.0.push(path.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.iter().any(|p| p == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Paths sorted and de-duplicated
    pub fn normalized(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.iter().collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        for path in &self.0 {
            if path.trim().is_empty() {
                return Err(RepositoryError::invalid_argument(
                    "includes",
                    "navigation path cannot be blank",
                ));
            }
            ValidatedFieldPath::new(path).map_err(|e| {
                RepositoryError::invalid_argument("includes", format!("path '{}': {}", path, e))
            })?;
        }
        Ok(())
    }
}

impl<S: AsRef<str>> FromIterator<S> for Includes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|p| p.as_ref().to_string()).collect())
    }
}
