//! Traits for data access
//!
//! This module contains the repository contract every data source implements,
//! and the change-tracking types the sources share.

pub mod repository;
pub mod tracking;

// Re-export all public items for convenience
pub use repository::Repository;
pub use tracking::{ChangeTracker, PendingChange, TrackingMode};
