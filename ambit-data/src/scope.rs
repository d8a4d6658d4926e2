//! Composable query modifiers.
//!
//! A [`Scope`] transforms a [`QueryBuilder`] into another one. Scopes are
//! applied with [`QueryBuilder::scope`], which stops applying them as soon as
//! one has attached an error, so a chain like
//!
//! ```
//! use ambit_data::query::QueryBuilder;
//! use ambit_data::scope::{order_by, paginate};
//!
//! let err = QueryBuilder::new("users")
//!     .scope(order_by("name; --", true))
//!     .scope(paginate(2, 10))
//!     .build_select("*")
//!     .unwrap_err();
//! assert!(err.is_validation());
//! ```
//!
//! reports the first failure when the query is built instead of at the call
//! site.

use chrono::{DateTime, Utc};

use crate::deleted::DeletedFilter;
use crate::field::is_valid_field_name;
use crate::query::QueryBuilder;
use crate::specification::Filter;

/// Column used by [`default_order`].
pub const DEFAULT_CREATED_COLUMN: &str = "created_at";

/// A query transformation.
pub trait Scope: Send {
    fn apply(self, query: QueryBuilder) -> QueryBuilder;
}

impl<F> Scope for F
where
    F: FnOnce(QueryBuilder) -> QueryBuilder + Send,
{
    fn apply(self, query: QueryBuilder) -> QueryBuilder {
        self(query)
    }
}

/// A type-erased scope, for building scope lists at runtime.
pub type BoxScope = Box<dyn FnOnce(QueryBuilder) -> QueryBuilder + Send>;

/// Identity scope.
pub fn noop() -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    |query: QueryBuilder| query
}

/// Apply every scope in order, stopping at the first attached error.
pub fn all(scopes: Vec<BoxScope>) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    move |query: QueryBuilder| scopes.into_iter().fold(query, |q, s| q.scope(s))
}

/// `LIMIT`/`OFFSET` for a 1-indexed page. Pages below 1 are treated as 1.
/// `limit` has no upper bound.
pub fn paginate(page: i64, limit: u64) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    move |query: QueryBuilder| {
        let page = page.max(1) as u64;
        let offset = (page - 1).saturating_mul(limit);
        query.limit(limit).offset(offset)
    }
}

/// Order by a caller-supplied field. An invalid name attaches a validation
/// error instead of reaching the SQL text.
pub fn order_by(field: impl Into<String>, ascending: bool) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    let field = field.into();
    move |query: QueryBuilder| {
        if !is_valid_field_name(&field) {
            return query.fail(format!("invalid field name: {field}"));
        }
        query.order_by(&field, ascending)
    }
}

/// Equality conditions for every pair the filter reports, ANDed together.
/// `None` and an empty filter both leave the query unfiltered.
pub fn where_by_spec<F: Filter + ?Sized>(spec: Option<&F>) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    let conditions = spec.map(|f| f.conditions()).unwrap_or_default();
    move |query: QueryBuilder| {
        conditions
            .into_iter()
            .fold(query, |q, (column, value)| q.where_eq(column, value))
    }
}

/// Relations to eager-load once the main query has run. Unknown relation
/// names are reported by the backend at execution time.
pub fn preload_relations<S: AsRef<str>>(relations: &[S]) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    let relations: Vec<String> = relations.iter().map(|r| r.as_ref().to_string()).collect();
    move |query: QueryBuilder| relations.iter().fold(query, |q, r| q.preload(r))
}

/// Restrict `column` to a time range. `None` bounds are open; with both
/// bounds present the range is closed on each end.
pub fn between_time(
    column: impl Into<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    let column = column.into();
    move |query: QueryBuilder| match (start, end) {
        (None, None) => query,
        (Some(start), None) => query.where_gte(&column, start),
        (None, Some(end)) => query.where_lte(&column, end),
        (Some(start), Some(end)) => query.where_between(&column, start, end),
    }
}

/// Newest first, by [`DEFAULT_CREATED_COLUMN`].
pub fn default_order() -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    default_order_by(DEFAULT_CREATED_COLUMN)
}

/// Newest first, by the given creation column.
pub fn default_order_by(column: &'static str) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    move |query: QueryBuilder| query.order_by(column, false)
}

/// Exclusive row lock for read-then-write sequences.
pub fn for_update(enable: bool) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    move |query: QueryBuilder| if enable { query.lock() } else { query }
}

/// Soft-delete visibility against the given marker column.
pub fn where_deleted(filter: DeletedFilter, column: &'static str) -> impl FnOnce(QueryBuilder) -> QueryBuilder + Send {
    move |query: QueryBuilder| filter.apply(query, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use chrono::TimeZone;

    fn select(query: QueryBuilder) -> (String, Vec<Value>) {
        query.build_select("*").unwrap()
    }

    #[test]
    fn paginate_offsets() {
        let (sql, _) = select(QueryBuilder::new("t").scope(paginate(3, 2)));
        assert_eq!(sql, "SELECT * FROM t LIMIT 2 OFFSET 4");
    }

    #[test]
    fn paginate_clamps_low_pages() {
        let first = select(QueryBuilder::new("t").scope(paginate(1, 2)));
        assert_eq!(select(QueryBuilder::new("t").scope(paginate(0, 2))), first);
        assert_eq!(select(QueryBuilder::new("t").scope(paginate(-1, 2))), first);
        assert_eq!(first.0, "SELECT * FROM t LIMIT 2 OFFSET 0");
    }

    #[test]
    fn order_by_directions() {
        let (asc, _) = select(QueryBuilder::new("t").scope(order_by("name", true)));
        assert_eq!(asc, "SELECT * FROM t ORDER BY name ASC");
        let (desc, _) = select(QueryBuilder::new("t").scope(order_by("t.age", false)));
        assert_eq!(desc, "SELECT * FROM t ORDER BY t.age DESC");
    }

    #[test]
    fn invalid_order_field_short_circuits() {
        let query = QueryBuilder::new("t")
            .scope(order_by("name'; DROP TABLE users; --", true))
            .scope(for_update(true))
            .scope(paginate(1, 5));
        assert_eq!(
            query.error(),
            Some("invalid field name: name'; DROP TABLE users; --")
        );
        assert!(!query.is_locked());
        assert!(query.build_select("*").is_err());
    }

    struct NameFilter {
        name: Option<String>,
        age: Option<i64>,
    }

    impl Filter for NameFilter {
        fn conditions(&self) -> Vec<(&'static str, Value)> {
            let mut out = Vec::new();
            if let Some(name) = &self.name {
                out.push(("name", Value::from(name)));
            }
            if let Some(age) = self.age {
                out.push(("age", Value::from(age)));
            }
            out
        }
    }

    #[test]
    fn where_by_spec_uses_set_fields_only() {
        let filter = NameFilter {
            name: Some("alice".into()),
            age: None,
        };
        let (sql, params) = select(QueryBuilder::new("t").scope(where_by_spec(Some(&filter))));
        assert_eq!(sql, "SELECT * FROM t WHERE name = ?");
        assert_eq!(params, vec![Value::from("alice")]);
    }

    #[test]
    fn where_by_spec_can_filter_on_zero() {
        let filter = NameFilter {
            name: None,
            age: Some(0),
        };
        let (sql, params) = select(QueryBuilder::new("t").scope(where_by_spec(Some(&filter))));
        assert_eq!(sql, "SELECT * FROM t WHERE age = ?");
        assert_eq!(params, vec![Value::Int(0)]);
    }

    #[test]
    fn where_by_spec_none_or_empty_matches_everything() {
        let (sql, _) = select(QueryBuilder::new("t").scope(where_by_spec::<NameFilter>(None)));
        assert_eq!(sql, "SELECT * FROM t");
        let empty = NameFilter {
            name: None,
            age: None,
        };
        let (sql, _) = select(QueryBuilder::new("t").scope(where_by_spec(Some(&empty))));
        assert_eq!(sql, "SELECT * FROM t");
    }

    #[test]
    fn preload_records_names() {
        let query = QueryBuilder::new("t").scope(preload_relations(&["Books", "Profile"]));
        assert_eq!(query.preloads().to_vec(), vec!["Books".to_string(), "Profile".to_string()]);
        let query = QueryBuilder::new("t").scope(preload_relations::<&str>(&[]));
        assert!(query.preloads().is_empty());
    }

    #[test]
    fn between_time_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let (sql, _) = select(QueryBuilder::new("t").scope(between_time("created_at", None, None)));
        assert_eq!(sql, "SELECT * FROM t");

        let (sql, params) =
            select(QueryBuilder::new("t").scope(between_time("created_at", Some(start), None)));
        assert_eq!(sql, "SELECT * FROM t WHERE created_at >= ?");
        assert_eq!(params, vec![Value::from(start)]);

        let (sql, _) =
            select(QueryBuilder::new("t").scope(between_time("created_at", None, Some(end))));
        assert_eq!(sql, "SELECT * FROM t WHERE created_at <= ?");

        let (sql, params) = select(
            QueryBuilder::new("t").scope(between_time("created_at", Some(start), Some(end))),
        );
        assert_eq!(sql, "SELECT * FROM t WHERE created_at BETWEEN ? AND ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn default_order_is_newest_first() {
        let (sql, _) = select(QueryBuilder::new("t").scope(default_order()));
        assert_eq!(sql, "SELECT * FROM t ORDER BY created_at DESC");
    }

    #[test]
    fn for_update_toggles_lock() {
        assert!(QueryBuilder::new("t").scope(for_update(true)).is_locked());
        assert!(!QueryBuilder::new("t").scope(for_update(false)).is_locked());
    }

    #[test]
    fn all_applies_in_order() {
        let scopes: Vec<BoxScope> = vec![
            Box::new(order_by("name", true)),
            Box::new(paginate(2, 10)),
            Box::new(noop()),
        ];
        let (sql, _) = select(QueryBuilder::new("t").scope(all(scopes)));
        assert_eq!(sql, "SELECT * FROM t ORDER BY name ASC LIMIT 10 OFFSET 10");
    }
}
