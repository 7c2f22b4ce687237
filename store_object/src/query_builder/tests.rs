use crate::query_builder::{
    Includes, ListQuery, Page, PageRequest, Predicate, SortSpec, SqlGenerator,
};
use serde_json::json;

// ========================================
// Predicate key tokens
// ========================================

#[test]
fn test_and_children_are_order_insensitive() {
    let a = Predicate::and(vec![Predicate::eq("name", "Math"), Predicate::gt("capacity", 20)]);
    let b = Predicate::and(vec![Predicate::gt("capacity", 20), Predicate::eq("name", "Math")]);
    assert_eq!(a.key_token(), b.key_token());
}

#[test]
fn test_and_differs_from_or() {
    let and = Predicate::and(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)]);
    let or = Predicate::or(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)]);
    assert_ne!(and.key_token(), or.key_token());
}

#[test]
fn test_single_child_group_collapses() {
    let grouped = Predicate::and(vec![Predicate::eq("name", "Math")]);
    assert_eq!(grouped.key_token(), Predicate::eq("name", "Math").key_token());
}

#[test]
fn test_nested_groups_flatten() {
    let nested = Predicate::and(vec![
        Predicate::eq("a", 1),
        Predicate::and(vec![Predicate::eq("b", 2), Predicate::eq("c", 3)]),
    ]);
    let flat = Predicate::and(vec![
        Predicate::eq("c", 3),
        Predicate::eq("a", 1),
        Predicate::eq("b", 2),
    ]);
    assert_eq!(nested.key_token(), flat.key_token());
}

#[test]
fn test_in_list_order_and_duplicates_ignored() {
    let a = Predicate::in_values("id", vec![json!(3), json!(1), json!(2), json!(1)]);
    let b = Predicate::in_values("id", vec![json!(1), json!(2), json!(3)]);
    assert_eq!(a.key_token(), b.key_token());
}

#[test]
fn test_literal_types_are_distinguished() {
    assert_ne!(
        Predicate::eq("code", 5).key_token(),
        Predicate::eq("code", "5").key_token()
    );
    assert_ne!(
        Predicate::eq("name", "Math").key_token(),
        Predicate::ne("name", "Math").key_token()
    );
    // Integer and float literals stay apart even when numerically equal
    assert_ne!(
        Predicate::eq("capacity", 1).key_token(),
        Predicate::eq("capacity", 1.0).key_token()
    );
}

#[test]
fn test_object_literal_key_order_ignored() {
    let a = Predicate::eq("meta", json!({"a": 1, "b": [2, 3]}));
    let b = Predicate::eq("meta", json!({"b": [2, 3], "a": 1}));
    assert_eq!(a.key_token(), b.key_token());
}

// ========================================
// Predicate validation
// ========================================

#[test]
fn test_validate_accepts_well_formed_predicates() {
    let predicate = Predicate::or(vec![
        Predicate::like("name", "Ma%"),
        Predicate::in_values("grade", vec![json!(1), json!(2)]),
        Predicate::is_null("teacher.name"),
    ]);
    assert!(predicate.validate().is_ok());
}

#[test]
fn test_validate_rejects_malformed_predicates() {
    let cases = [
        Predicate::eq("", 1),
        Predicate::eq("name; drop", 1),
        Predicate::condition("name", crate::query_builder::QueryOperator::Eq, None),
        Predicate::condition(
            "grade",
            crate::query_builder::QueryOperator::In,
            Some(json!(1)),
        ),
        Predicate::condition("name", crate::query_builder::QueryOperator::Like, Some(json!(5))),
        Predicate::and(vec![]),
    ];

    for predicate in cases {
        let err = predicate.validate().unwrap_err();
        assert!(err.is_invalid_argument(), "expected InvalidArgument for {:?}", predicate);
    }
}

// ========================================
// Predicate evaluation
// ========================================

#[test]
fn test_matches_rows() {
    let row = json!({"id": 1, "name": "Mathematics", "capacity": 30, "room": null});

    assert!(Predicate::eq("name", "Mathematics").matches(&row));
    assert!(Predicate::ilike("name", "math%").matches(&row));
    assert!(!Predicate::like("name", "math%").matches(&row));
    assert!(Predicate::gte("capacity", 30).matches(&row));
    assert!(!Predicate::gt("capacity", 30).matches(&row));
    assert!(Predicate::in_values("id", vec![json!(1), json!(2)]).matches(&row));
    assert!(Predicate::not_in_values("id", vec![json!(2)]).matches(&row));
    assert!(Predicate::is_null("room").matches(&row));
    assert!(Predicate::is_null("missing").matches(&row));
    assert!(Predicate::is_not_null("name").matches(&row));
}

#[test]
fn test_nulls_never_compare() {
    let row = json!({"room": null});
    assert!(!Predicate::eq("room", "A1").matches(&row));
    assert!(!Predicate::ne("room", "A1").matches(&row));
    assert!(!Predicate::lt("room", "Z").matches(&row));
    assert!(!Predicate::not_in_values("room", vec![json!("A1")]).matches(&row));
}

#[test]
fn test_groups_evaluate() {
    let row = json!({"a": 1, "b": 2});
    assert!(Predicate::and(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)]).matches(&row));
    assert!(!Predicate::and(vec![Predicate::eq("a", 1), Predicate::eq("b", 3)]).matches(&row));
    assert!(Predicate::or(vec![Predicate::eq("a", 9), Predicate::eq("b", 2)]).matches(&row));
}

// ========================================
// ListQuery, Includes, paging
// ========================================

#[test]
fn test_list_query_filters_are_and_combined() {
    let query = ListQuery::new()
        .filter(Predicate::eq("a", 1))
        .filter(Predicate::eq("b", 2))
        .filter(Predicate::eq("c", 3));

    match query.predicate() {
        Some(Predicate::Group { filters, .. }) => assert_eq!(filters.len(), 3),
        other => panic!("expected an AND group, got {:?}", other),
    }
    assert!(ListQuery::new().validate_with_predicate().is_err());
    assert!(query.validate_with_predicate().is_ok());
}

#[test]
fn test_includes_normalized_and_validated() {
    let includes: Includes = ["Teacher", "Students", "Teacher"].into_iter().collect();
    assert_eq!(includes.normalized(), vec!["Students", "Teacher"]);
    assert!(includes.validate().is_ok());

    let blank = Includes::new().with("Students").with(" ");
    assert!(blank.validate().unwrap_err().is_invalid_argument());
}

#[test]
fn test_page_request() {
    let request = PageRequest::new(2, 10)
        .sorted_by(SortSpec::desc("name"))
        .sorted_by(SortSpec::asc("capacity"));
    assert_eq!(request.offset(), 20);
    assert_eq!(request.sort_tokens(), vec!["capacity:asc", "name:desc"]);
    assert!(request.validate().is_ok());

    assert!(PageRequest::new(0, 0).validate().is_err());
    assert!(PageRequest::new(0, 5).sorted_by(SortSpec::asc("bad field")).validate().is_err());
}

#[test]
fn test_page_totals() {
    let page = Page {
        items: vec![1, 2, 3],
        page_index: 0,
        page_size: 3,
        total_count: 7,
    };
    assert_eq!(page.total_pages(), 3);
    assert!(page.has_next());
}

#[test]
fn test_page_beyond_the_last_index() {
    let page: Page<i32> = Page {
        items: vec![],
        page_index: u64::MAX,
        page_size: 1,
        total_count: 3,
    };
    assert!(PageRequest::new(u64::MAX, 1).validate().is_ok());
    assert!(!page.has_next());
    assert!(page.is_empty());
}

// ========================================
// SQL generation
// ========================================

#[test]
fn test_where_clause_binds_literals() {
    let predicate = Predicate::and(vec![
        Predicate::eq("name", "'; DROP TABLE classrooms; --"),
        Predicate::in_values("grade", vec![json!(1), json!(2)]),
        Predicate::is_null("room"),
    ]);

    let (sql, values) = SqlGenerator::build_where_clause(Some(&predicate), "t", 0);
    assert_eq!(
        sql,
        "WHERE (\"t\".\"name\" = $1 AND \"t\".\"grade\" IN ($2, $3) AND \"t\".\"room\" IS NULL)"
    );
    assert_eq!(values.len(), 3);
    assert_eq!(values[0], json!("'; DROP TABLE classrooms; --"));
}

#[test]
fn test_where_clause_offsets_placeholders() {
    let (sql, values) = SqlGenerator::build_where_clause(Some(&Predicate::gt("capacity", 10)), "t", 2);
    assert_eq!(sql, "WHERE \"t\".\"capacity\" > $3");
    assert_eq!(values, vec![json!(10)]);

    let (sql, values) = SqlGenerator::build_where_clause(None, "t", 0);
    assert!(sql.is_empty());
    assert!(values.is_empty());
}

#[test]
fn test_empty_in_lists() {
    let (sql, _) = SqlGenerator::build_where_clause(Some(&Predicate::in_values("id", vec![])), "t", 0);
    assert_eq!(sql, "WHERE 1=0");
}

#[test]
fn test_order_and_limit_clauses() {
    assert_eq!(
        SqlGenerator::build_order_clause(&[SortSpec::desc("name")], "t", "id"),
        "ORDER BY \"t\".\"name\" DESC"
    );
    assert_eq!(
        SqlGenerator::build_order_clause(&[], "t", "id"),
        "ORDER BY \"t\".\"id\" ASC"
    );
    assert_eq!(SqlGenerator::build_limit_clause(Some(10), Some(20)), "LIMIT 10 OFFSET 20");
    assert_eq!(SqlGenerator::build_limit_clause(None, None), "");
}
