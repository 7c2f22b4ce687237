//! Statement building for the PostgreSQL source
//!
//! Every statement reads or writes rows as `jsonb`, so entities only need serde.

use super::entity::{PgEntity, Relation, RelationKind};
use crate::errors::RepositoryError;
use crate::id_type::KeyValue;
use crate::query_builder::{ListQuery, PageRequest, Predicate, SortSpec, SqlGenerator};
use crate::validation::{quote_identifier, validate_identifier, ValidatedTableName};
use serde_json::Value;

pub(crate) const ROOT_ALIAS: &str = "t";
const RELATED_ALIAS: &str = "r";

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Bind a JSON literal with the closest native PostgreSQL type
macro_rules! bind_json_param {
    ($query:expr, $param:expr) => {
        match $param {
            serde_json::Value::String(s) => {
                // Try to parse as RFC3339 timestamp first
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&s) {
                    $query.bind(dt.with_timezone(&chrono::Utc))
                // Try to parse as UUID
                } else if let Ok(uuid) = uuid::Uuid::parse_str(&s) {
                    $query.bind(uuid)
                } else {
                    $query.bind(s)
                }
            }
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i >= i32::MIN as i64 && i <= i32::MAX as i64 {
                        $query.bind(i as i32)
                    } else {
                        $query.bind(i)
                    }
                } else if let Some(f) = n.as_f64() {
                    $query.bind(f)
                } else {
                    $query.bind(n.to_string())
                }
            }
            serde_json::Value::Bool(b) => $query.bind(b),
            serde_json::Value::Null => $query.bind(Option::<String>::None),
            other => $query.bind(other),
        }
    };
}

pub(crate) use bind_json_param;

fn table<T: PgEntity>() -> Result<ValidatedTableName, RepositoryError> {
    ValidatedTableName::new(T::table_name())
        .map_err(|e| RepositoryError::invalid_argument("table", e.to_string()))
}

fn column(name: &str) -> Result<&str, RepositoryError> {
    validate_identifier(name)
        .map(|_| name)
        .map_err(|e| RepositoryError::invalid_argument("column", e.to_string()))
}

/// Nested paths are only meaningful in memory; SQL reads address root columns
fn require_root_columns(predicate: Option<&Predicate>, sort: &[SortSpec]) -> Result<(), RepositoryError> {
    let fields = predicate
        .map(Predicate::fields)
        .unwrap_or_default()
        .into_iter()
        .chain(sort.iter().map(|s| s.field.as_str()));
    for field in fields {
        if field.contains('.') {
            return Err(RepositoryError::invalid_argument(
                "predicate",
                format!("nested field '{}' is not supported by the PostgreSQL source", field),
            ));
        }
    }
    Ok(())
}

fn relation_projection(relation: &Relation) -> Result<String, RepositoryError> {
    let related_table = ValidatedTableName::new(relation.table)
        .map_err(|e| RepositoryError::invalid_argument("relation", e.to_string()))?;
    let join = format!(
        "{} = {}",
        SqlGenerator::column_ref(RELATED_ALIAS, column(relation.remote_field)?),
        SqlGenerator::column_ref(ROOT_ALIAS, column(relation.local_field)?),
    );
    let related = quote_identifier(RELATED_ALIAS);

    Ok(match relation.kind {
        RelationKind::HasMany => format!(
            "COALESCE((SELECT jsonb_agg(to_jsonb({related})) FROM {} AS {related} WHERE {join}), '[]'::jsonb)",
            related_table.quoted()
        ),
        RelationKind::HasOne => format!(
            "(SELECT to_jsonb({related}) FROM {} AS {related} WHERE {join} LIMIT 1)",
            related_table.quoted()
        ),
    })
}

/// Row projection: the root row as jsonb merged with one entry per include
fn projection<T: PgEntity>(query: &ListQuery) -> Result<String, RepositoryError> {
    let root = format!("to_jsonb({})", quote_identifier(ROOT_ALIAS));
    let includes = query.includes().normalized();
    if includes.is_empty() {
        return Ok(root);
    }

    let mut entries = Vec::with_capacity(includes.len());
    for path in includes {
        let relation = T::relation(path).ok_or_else(|| RepositoryError::unknown_navigation(T::kind(), path))?;
        // Relation names are validated identifiers, safe inside a string literal
        validate_identifier(relation.name)
            .map_err(|e| RepositoryError::invalid_argument("relation", e.to_string()))?;
        entries.push(format!("'{}', {}", relation.name, relation_projection(&relation)?));
    }

    Ok(format!("{} || jsonb_build_object({})", root, entries.join(", ")))
}

/// `SELECT` returning one jsonb row per matching entity
pub fn select_statement<T: PgEntity>(
    query: &ListQuery,
    page: Option<&PageRequest>,
    limit: Option<u64>,
) -> Result<Statement, RepositoryError> {
    let sort = page.map(|p| p.sort.as_slice()).unwrap_or_default();
    require_root_columns(query.predicate(), sort)?;

    let table = table::<T>()?;
    let projection = projection::<T>(query)?;
    let (where_clause, params) = SqlGenerator::build_where_clause(query.predicate(), ROOT_ALIAS, 0);
    let order_clause = SqlGenerator::build_order_clause(sort, ROOT_ALIAS, column(T::primary_key_field())?);
    let limit_clause = match page {
        Some(page) => SqlGenerator::build_limit_clause(Some(page.page_size), Some(page.offset())),
        None => SqlGenerator::build_limit_clause(limit, None),
    };

    let mut sql = format!(
        "SELECT {} AS row FROM {} AS {}",
        projection,
        table.quoted(),
        quote_identifier(ROOT_ALIAS)
    );
    for clause in [where_clause, order_clause, limit_clause] {
        if !clause.is_empty() {
            sql.push(' ');
            sql.push_str(&clause);
        }
    }

    Ok(Statement { sql, params })
}

pub fn count_statement<T: PgEntity>(query: &ListQuery) -> Result<Statement, RepositoryError> {
    require_root_columns(query.predicate(), &[])?;
    let table = table::<T>()?;
    let (where_clause, params) = SqlGenerator::build_where_clause(query.predicate(), ROOT_ALIAS, 0);

    let mut sql = format!("SELECT COUNT(*) FROM {} AS {}", table.quoted(), quote_identifier(ROOT_ALIAS));
    if !where_clause.is_empty() {
        sql.push(' ');
        sql.push_str(&where_clause);
    }
    Ok(Statement { sql, params })
}

pub fn find_by_key_statement<T: PgEntity>(key: &KeyValue) -> Result<Statement, RepositoryError> {
    let query = ListQuery::filtered(Predicate::eq(T::primary_key_field(), key.to_json()));
    select_statement::<T>(&query, None, Some(1))
}

/// Insert the entity's own columns from its JSON form; unknown keys are ignored
pub fn insert_statement<T: PgEntity>(row: Value) -> Result<Statement, RepositoryError> {
    let table = table::<T>()?;
    Ok(Statement {
        sql: format!(
            "INSERT INTO {table} SELECT * FROM jsonb_populate_record(NULL::{table}, $1)",
            table = table.quoted()
        ),
        params: vec![row],
    })
}

/// Columns written by an update: the row's keys minus key, navigations and version
fn update_columns<T: PgEntity>(row: &Value) -> Result<Vec<String>, RepositoryError> {
    let Some(object) = row.as_object() else {
        return Err(RepositoryError::invalid_argument(
            "entity",
            "entity must serialize to a JSON object",
        ));
    };

    let relations = T::relations();
    let mut columns = Vec::new();
    for name in object.keys() {
        let skip = name == T::primary_key_field()
            || Some(name.as_str()) == T::concurrency_field()
            || relations.iter().any(|r| r.name == name);
        if !skip {
            columns.push(column(name)?.to_string());
        }
    }
    Ok(columns)
}

/// Guarded update; zero affected rows means the row moved or vanished
pub fn update_statement<T: PgEntity>(
    key: &KeyValue,
    row: Value,
    expected_version: Option<u64>,
) -> Result<Statement, RepositoryError> {
    let table = table::<T>()?;
    let primary_key = column(T::primary_key_field())?;
    let columns = update_columns::<T>(&row)?;
    let populated = quote_identifier(RELATED_ALIAS);

    let mut assignments = Vec::new();
    if columns.is_empty() {
        let pk = quote_identifier(primary_key);
        assignments.push(format!("{pk} = {pk}"));
    } else {
        let targets: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
        let sources: Vec<String> = columns
            .iter()
            .map(|c| SqlGenerator::column_ref(RELATED_ALIAS, c))
            .collect();
        assignments.push(format!(
            "({}) = (SELECT {} FROM jsonb_populate_record(NULL::{}, $1) AS {populated})",
            targets.join(", "),
            sources.join(", "),
            table.quoted()
        ));
    }

    let mut params = vec![row, key.to_json()];
    let mut guard = format!("{} = $2", SqlGenerator::column_ref(ROOT_ALIAS, primary_key));

    if let Some(version_field) = T::concurrency_field() {
        let version_field = column(version_field)?;
        assignments.push(format!(
            "{} = {} + 1",
            quote_identifier(version_field),
            SqlGenerator::column_ref(ROOT_ALIAS, version_field)
        ));
        if let Some(expected) = expected_version {
            params.push(Value::from(expected));
            guard.push_str(&format!(
                " AND {} = $3",
                SqlGenerator::column_ref(ROOT_ALIAS, version_field)
            ));
        }
    }

    Ok(Statement {
        sql: format!(
            "UPDATE {} AS {} SET {} WHERE {}",
            table.quoted(),
            quote_identifier(ROOT_ALIAS),
            assignments.join(", "),
            guard
        ),
        params,
    })
}

pub fn delete_statement<T: PgEntity>(
    key: &KeyValue,
    expected_version: Option<u64>,
) -> Result<Statement, RepositoryError> {
    let table = table::<T>()?;
    let primary_key = column(T::primary_key_field())?;
    let mut sql = format!(
        "DELETE FROM {} AS {} WHERE {} = $1",
        table.quoted(),
        quote_identifier(ROOT_ALIAS),
        SqlGenerator::column_ref(ROOT_ALIAS, primary_key)
    );
    let mut params = vec![key.to_json()];

    if let (Some(version_field), Some(expected)) = (T::concurrency_field(), expected_version) {
        sql.push_str(&format!(
            " AND {} = $2",
            SqlGenerator::column_ref(ROOT_ALIAS, column(version_field)?)
        ));
        params.push(Value::from(expected));
    }

    Ok(Statement { sql, params })
}

/// Concurrency token carried by the entity itself
pub fn version_of<T: PgEntity>(row: &Value) -> Option<u64> {
    T::concurrency_field().and_then(|field| row.get(field)).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::query_builder::SortSpec;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Classroom {
        id: i64,
        name: String,
        teacher_id: Option<i64>,
        row_version: i64,
        #[serde(default, rename = "Students")]
        students: Vec<Value>,
    }

    impl Entity for Classroom {
        fn kind() -> &'static str {
            "Classroom"
        }

        fn key(&self) -> KeyValue {
            KeyValue::Numeric(self.id)
        }

        fn navigations() -> &'static [&'static str] {
            &["Students", "Teacher"]
        }
    }

    impl PgEntity for Classroom {
        fn table_name() -> &'static str {
            "classrooms"
        }

        fn relations() -> Vec<Relation> {
            vec![
                Relation::has_many("Students", "students", "id", "classroom_id"),
                Relation::has_one("Teacher", "teachers", "teacher_id", "id"),
            ]
        }

        fn concurrency_field() -> Option<&'static str> {
            Some("row_version")
        }
    }

    #[test]
    fn test_select_without_includes() {
        let query = ListQuery::filtered(Predicate::eq("name", "Math"));
        let statement = select_statement::<Classroom>(&query, None, None).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT to_jsonb(\"t\") AS row FROM \"classrooms\" AS \"t\" WHERE \"t\".\"name\" = $1 ORDER BY \"t\".\"id\" ASC"
        );
        assert_eq!(statement.params, vec![json!("Math")]);
    }

    #[test]
    fn test_select_with_includes_and_page() {
        let query = ListQuery::new().include("Teacher").include("Students");
        let page = PageRequest::new(1, 10).sorted_by(SortSpec::desc("name"));
        let statement = select_statement::<Classroom>(&query, Some(&page), None).unwrap();

        assert!(statement.sql.contains("jsonb_build_object('Students', COALESCE((SELECT jsonb_agg(to_jsonb(\"r\")) FROM \"students\" AS \"r\" WHERE \"r\".\"classroom_id\" = \"t\".\"id\"), '[]'::jsonb), 'Teacher', (SELECT to_jsonb(\"r\") FROM \"teachers\" AS \"r\" WHERE \"r\".\"id\" = \"t\".\"teacher_id\" LIMIT 1))"));
        assert!(statement.sql.ends_with("ORDER BY \"t\".\"name\" DESC LIMIT 10 OFFSET 10"));
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_unknown_include_and_nested_field_rejected() {
        let err = select_statement::<Classroom>(&ListQuery::new().include("Courses"), None, None).unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownNavigation { .. }));

        let err = select_statement::<Classroom>(
            &ListQuery::filtered(Predicate::eq("Teacher.name", "Ada")),
            None,
            None,
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_count_and_find_by_key() {
        let statement = count_statement::<Classroom>(&ListQuery::new()).unwrap();
        assert_eq!(statement.sql, "SELECT COUNT(*) FROM \"classrooms\" AS \"t\"");

        let statement = find_by_key_statement::<Classroom>(&KeyValue::Numeric(7)).unwrap();
        assert!(statement.sql.ends_with("WHERE \"t\".\"id\" = $1 ORDER BY \"t\".\"id\" ASC LIMIT 1"));
        assert_eq!(statement.params, vec![json!(7)]);
    }

    #[test]
    fn test_update_is_guarded_by_version() {
        let row = json!({"id": 3, "name": "Physics", "teacher_id": null, "row_version": 4, "Students": []});
        let statement = update_statement::<Classroom>(&KeyValue::Numeric(3), row.clone(), version_of::<Classroom>(&row)).unwrap();

        assert_eq!(
            statement.sql,
            "UPDATE \"classrooms\" AS \"t\" SET (\"name\", \"teacher_id\") = (SELECT \"r\".\"name\", \"r\".\"teacher_id\" FROM jsonb_populate_record(NULL::\"classrooms\", $1) AS \"r\"), \"row_version\" = \"t\".\"row_version\" + 1 WHERE \"t\".\"id\" = $2 AND \"t\".\"row_version\" = $3"
        );
        assert_eq!(statement.params[1], json!(3));
        assert_eq!(statement.params[2], json!(4));
    }

    #[test]
    fn test_insert_and_delete() {
        let statement = insert_statement::<Classroom>(json!({"id": 1})).unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"classrooms\" SELECT * FROM jsonb_populate_record(NULL::\"classrooms\", $1)"
        );

        let statement = delete_statement::<Classroom>(&KeyValue::Numeric(1), Some(2)).unwrap();
        assert_eq!(
            statement.sql,
            "DELETE FROM \"classrooms\" AS \"t\" WHERE \"t\".\"id\" = $1 AND \"t\".\"row_version\" = $2"
        );
        let unguarded = delete_statement::<Classroom>(&KeyValue::Numeric(1), None).unwrap();
        assert_eq!(unguarded.params.len(), 1);
    }
}
