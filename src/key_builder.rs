//! Cache key derivation
//!
//! Keys are plain `.`-joined strings so they stay readable in a cache browser and
//! a whole entity namespace can be removed by prefix.
//!
//! Layout: `{prefix}.{kind}.{operation}[.where=…][.include=…][.page=…][.sort=…][.key=…]`

use store_object::{Includes, KeyValue, ListQuery, PageRequest, Predicate};

/// Parameters of one read, borrowed from the caller
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyParams<'a> {
    pub predicate: Option<&'a Predicate>,
    pub includes: Option<&'a Includes>,
    pub page: Option<&'a PageRequest>,
    pub key: Option<&'a KeyValue>,
}

impl<'a> KeyParams<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate and includes of a list query
    pub fn query(query: &'a ListQuery) -> Self {
        Self {
            predicate: query.predicate(),
            includes: Some(query.includes()),
            ..Self::default()
        }
    }

    pub fn with_predicate(mut self, predicate: Option<&'a Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_page(mut self, page: &'a PageRequest) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_key(mut self, key: &'a KeyValue) -> Self {
        self.key = Some(key);
        self
    }
}

/// Builds canonical cache keys under one namespace prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}.{kind}`, the unit of invalidation
    pub fn namespace(&self, kind: &str) -> String {
        format!("{}.{}", self.prefix, kind)
    }

    /// Prefix removed on commit; the trailing dot keeps `Class` from matching `Classroom`
    pub fn invalidation_prefix(&self, kind: &str) -> String {
        format!("{}.", self.namespace(kind))
    }

    /// Canonical key for one read. Arguments are expected to be validated already.
    pub fn build(&self, kind: &str, operation: &str, params: &KeyParams<'_>) -> String {
        let mut key = format!("{}.{}", self.namespace(kind), operation);

        if let Some(predicate) = params.predicate {
            key.push_str(".where=");
            key.push_str(&predicate.key_token());
        }

        if let Some(includes) = params.includes.filter(|i| !i.is_empty()) {
            key.push_str(".include=");
            key.push_str(&includes.normalized().join(","));
        }

        if let Some(page) = params.page {
            key.push_str(&format!(".page={}:{}", page.page_index, page.page_size));
            let sort = page.sort_tokens();
            if !sort.is_empty() {
                key.push_str(".sort=");
                key.push_str(&sort.join(","));
            }
        }

        if let Some(value) = params.key {
            key.push_str(".key=");
            key.push_str(&value.key_token());
        }

        crate::trace_log!(key = %key, "cache key built");
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_object::SortSpec;

    fn keys() -> KeyBuilder {
        KeyBuilder::new("school")
    }

    #[test]
    fn test_include_order_does_not_matter() {
        let a = ListQuery::new().include("Students").include("Teacher");
        let b = ListQuery::new().include("Teacher").include("Students");
        assert_eq!(
            keys().build("Classroom", "select_list", &KeyParams::query(&a)),
            keys().build("Classroom", "select_list", &KeyParams::query(&b)),
        );
        assert_eq!(
            keys().build("Classroom", "select_list", &KeyParams::query(&a)),
            "school.Classroom.select_list.include=Students,Teacher"
        );
    }

    #[test]
    fn test_sort_order_does_not_matter() {
        let a = PageRequest::new(0, 10)
            .sorted_by(SortSpec::asc("name"))
            .sorted_by(SortSpec::desc("capacity"));
        let b = PageRequest::new(0, 10)
            .sorted_by(SortSpec::desc("capacity"))
            .sorted_by(SortSpec::asc("name"));
        let query = ListQuery::new();

        let key_a = keys().build("Classroom", "select_page", &KeyParams::query(&query).with_page(&a));
        let key_b = keys().build("Classroom", "select_page", &KeyParams::query(&query).with_page(&b));
        assert_eq!(key_a, key_b);
        assert_eq!(key_a, "school.Classroom.select_page.page=0:10.sort=capacity:desc,name:asc");
    }

    #[test]
    fn test_different_reads_differ() {
        let all = ListQuery::new();
        let filtered = ListQuery::filtered(Predicate::eq("name", "Math"));
        let page_one = PageRequest::new(1, 10);
        let page_two = PageRequest::new(2, 10);

        let built = [
            keys().build("Classroom", "select_list", &KeyParams::query(&all)),
            keys().build("Classroom", "select_list", &KeyParams::query(&filtered)),
            keys().build("Classroom", "count", &KeyParams::query(&filtered)),
            keys().build("Student", "select_list", &KeyParams::query(&all)),
            keys().build("Classroom", "select_page", &KeyParams::query(&all).with_page(&page_one)),
            keys().build("Classroom", "select_page", &KeyParams::query(&all).with_page(&page_two)),
            keys().build("Classroom", "find_by_key", &KeyParams::new().with_key(&KeyValue::from(5))),
            keys().build("Classroom", "find_by_key", &KeyParams::new().with_key(&KeyValue::from("5"))),
        ];

        for (i, a) in built.iter().enumerate() {
            for b in built.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_every_key_lives_under_its_invalidation_prefix() {
        let query = ListQuery::filtered(Predicate::eq("name", "Math")).include("Teacher");
        let key = keys().build("Classroom", "select_list", &KeyParams::query(&query));
        assert!(key.starts_with(&keys().invalidation_prefix("Classroom")));
        assert!(!key.starts_with(&keys().invalidation_prefix("Class")));
        assert_eq!(keys().namespace("Classroom"), "school.Classroom");
    }

    #[test]
    fn test_find_by_key_layout() {
        let key = keys().build(
            "Classroom",
            "find_by_key",
            &KeyParams::new().with_key(&KeyValue::from(42)),
        );
        assert_eq!(key, "school.Classroom.find_by_key.key=n:42");
    }
}
