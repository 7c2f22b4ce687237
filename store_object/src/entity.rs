//! Entity contract
//!
//! Every record kind a repository serves implements `Entity`.

use crate::id_type::KeyValue;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A record identified by a primary-key value
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity kind, used as the cache namespace segment (e.g. `Classroom`)
    fn kind() -> &'static str;

    /// Primary key of this record
    fn key(&self) -> KeyValue;

    /// Navigation paths that can be requested through includes
    fn navigations() -> &'static [&'static str] {
        &[]
    }

    /// Drop a navigation value that the current query did not request
    fn clear_navigation(&mut self, _path: &str) {}

    fn has_navigation(path: &str) -> bool {
        Self::navigations().contains(&path)
    }
}
