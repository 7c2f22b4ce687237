//! In-memory data source
//!
//! A table shared between sessions plus a unit-of-work session over it. Used by
//! tests and demos, and as the reference behaviour for other data sources.

mod source;
mod table;


pub use source::InMemoryDataSource;
pub use table::InMemoryTable;
