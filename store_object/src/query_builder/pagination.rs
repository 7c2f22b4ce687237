//! Paging parameters and paged results

use crate::errors::RepositoryError;
use crate::query_builder::ordering::SortSpec;
use serde::{Deserialize, Serialize};

/// Zero-based page request with its sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_index: u64,
    pub page_size: u64,
    pub sort: Vec<SortSpec>,
}

impl PageRequest {
    pub fn new(page_index: u64, page_size: u64) -> Self {
        Self {
            page_index,
            page_size,
            sort: Vec::new(),
        }
    }

    pub fn sorted_by(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.page_size == 0 {
            return Err(RepositoryError::invalid_argument(
                "page_size",
                "must be greater than zero",
            ));
        }
        self.sort.iter().try_for_each(SortSpec::validate)
    }

    pub fn offset(&self) -> u64 {
        self.page_index.saturating_mul(self.page_size)
    }

    /// Sort tokens in lexicographic order
    pub fn sort_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.sort.iter().map(SortSpec::key_token).collect();
        tokens.sort();
        tokens
    }
}

/// One page of results plus the total row count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: u64,
    pub page_size: u64,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
