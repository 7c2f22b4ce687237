//! PostgreSQL mapping of an entity

use crate::entity::Entity;

/// Cardinality of a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Loaded as a JSON array (empty when nothing matches)
    HasMany,
    /// Loaded as a JSON object or null
    HasOne,
}

/// Maps an include path to the rows of another table.
///
/// Related rows satisfy `remote.remote_field = root.local_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub table: &'static str,
    pub local_field: &'static str,
    pub remote_field: &'static str,
    pub kind: RelationKind,
}

impl Relation {
    pub fn has_many(
        name: &'static str,
        table: &'static str,
        local_field: &'static str,
        remote_field: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            local_field,
            remote_field,
            kind: RelationKind::HasMany,
        }
    }

    pub fn has_one(
        name: &'static str,
        table: &'static str,
        local_field: &'static str,
        remote_field: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            local_field,
            remote_field,
            kind: RelationKind::HasOne,
        }
    }
}

/// An entity stored in a PostgreSQL table.
///
/// Serialized field names must match column names; navigation fields are named
/// after their relation and should be `#[serde(default)]` so rows loaded without
/// the include still deserialize.
pub trait PgEntity: Entity {
    fn table_name() -> &'static str;

    fn primary_key_field() -> &'static str {
        "id"
    }

    fn relations() -> Vec<Relation> {
        Vec::new()
    }

    /// Integer column incremented on every write and checked by updates and deletes
    fn concurrency_field() -> Option<&'static str> {
        None
    }

    fn relation(name: &str) -> Option<Relation> {
        Self::relations().into_iter().find(|r| r.name == name)
    }
}
