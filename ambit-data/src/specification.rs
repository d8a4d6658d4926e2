use crate::deleted::DeletedFilter;
use crate::entity::Entity;
use crate::query::QueryBuilder;
use crate::scope;
use crate::value::Value;

/// Maps a typed filter to equality conditions.
///
/// Implementations report a pair for every field the caller set, which is
/// why filter structs use `Option` fields: `Some(0)` filters on zero, `None`
/// leaves the column unconstrained.
pub trait Filter: Send + Sync {
    fn conditions(&self) -> Vec<(&'static str, Value)>;
}

/// The empty filter, for entities that are never filtered by field.
impl Filter for () {
    fn conditions(&self) -> Vec<(&'static str, Value)> {
        Vec::new()
    }
}

/// What a query should select: an optional filter, relations to eager-load,
/// row locking and soft-delete visibility.
pub struct Specification<T: Entity> {
    pub filter: Option<T::Filter>,
    pub preload: Vec<String>,
    pub for_update: bool,
    pub deleted: DeletedFilter,
}

impl<T: Entity> Default for Specification<T> {
    fn default() -> Self {
        Self {
            filter: None,
            preload: Vec::new(),
            for_update: false,
            deleted: DeletedFilter::default(),
        }
    }
}

impl<T: Entity> std::fmt::Debug for Specification<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specification")
            .field("entity", &T::table_name())
            .field("filtered", &self.filter.is_some())
            .field("preload", &self.preload)
            .field("for_update", &self.for_update)
            .field("deleted", &self.deleted)
            .finish()
    }
}

impl<T: Entity> Specification<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: T::Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn preload(mut self, relation: impl Into<String>) -> Self {
        self.preload.push(relation.into());
        self
    }

    pub fn for_update(mut self, enable: bool) -> Self {
        self.for_update = enable;
        self
    }

    pub fn deleted(mut self, deleted: DeletedFilter) -> Self {
        self.deleted = deleted;
        self
    }

    /// Apply the specification to `query`: filter, newest-first order,
    /// preloads, locking, then soft-delete visibility.
    pub fn apply_to(&self, query: QueryBuilder) -> QueryBuilder {
        let query = query
            .scope(scope::where_by_spec(self.filter.as_ref()))
            .scope(scope::default_order_by(T::created_at_column()))
            .scope(scope::preload_relations(&self.preload))
            .scope(scope::for_update(self.for_update));
        self.apply_deleted(query)
    }

    /// Filter and soft-delete visibility only, for counting.
    pub fn apply_filter(&self, query: QueryBuilder) -> QueryBuilder {
        let query = query.scope(scope::where_by_spec(self.filter.as_ref()));
        self.apply_deleted(query)
    }

    fn apply_deleted(&self, query: QueryBuilder) -> QueryBuilder {
        match (self.deleted, T::deleted_at_column()) {
            (DeletedFilter::IncludeDeleted, _) => query,
            (filter, Some(column)) => query.scope(scope::where_deleted(filter, column)),
            (_, None) => query.fail(format!(
                "entity {} has no deleted marker column",
                T::table_name()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, PartialEq)]
    struct Book {
        id: i64,
        title: String,
        pages: i64,
    }

    #[derive(Default)]
    struct BookFilter {
        title: Option<String>,
        pages: Option<i64>,
    }

    impl Filter for BookFilter {
        fn conditions(&self) -> Vec<(&'static str, Value)> {
            let mut out = Vec::new();
            if let Some(title) = &self.title {
                out.push(("title", title.into()));
            }
            if let Some(pages) = self.pages {
                out.push(("pages", pages.into()));
            }
            out
        }
    }

    impl Entity for Book {
        type Filter = BookFilter;
        fn table_name() -> &'static str {
            "books"
        }
        fn id(&self) -> Value {
            self.id.into()
        }
        fn values(&self) -> Vec<(&'static str, Value)> {
            vec![("title", (&self.title).into()), ("pages", self.pages.into())]
        }
    }

    #[derive(Default, PartialEq)]
    struct Counter {
        id: i64,
    }

    impl Entity for Counter {
        type Filter = ();
        fn table_name() -> &'static str {
            "counters"
        }
        fn id(&self) -> Value {
            self.id.into()
        }
        fn values(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }
        fn deleted_at_column() -> Option<&'static str> {
            None
        }
    }

    #[test]
    fn scopes_apply_in_fixed_order() {
        let spec = Specification::<Book>::new()
            .filter(BookFilter {
                pages: Some(0),
                ..Default::default()
            })
            .preload("Author")
            .deleted(DeletedFilter::ExcludeDeleted);
        let query = spec.apply_to(QueryBuilder::new(Book::table_name()));
        assert_eq!(query.preloads().to_vec(), vec!["Author".to_string()]);
        let (sql, params) = query.build_select("*").unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM books WHERE pages = ? AND deleted_at IS NULL ORDER BY created_at DESC"
        );
        assert_eq!(params, vec![Value::Int(0)]);
    }

    #[test]
    fn default_spec_selects_everything() {
        let spec = Specification::<Book>::default();
        let (sql, params) = spec
            .apply_to(QueryBuilder::new("books"))
            .build_select("*")
            .unwrap();
        assert_eq!(sql, "SELECT * FROM books ORDER BY created_at DESC");
        assert!(params.is_empty());
    }

    #[test]
    fn count_ignores_order_and_lock() {
        let spec = Specification::<Book>::new()
            .for_update(true)
            .deleted(DeletedFilter::OnlyDeleted);
        let (sql, _) = spec
            .apply_filter(QueryBuilder::new("books"))
            .build_count()
            .unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM books WHERE deleted_at IS NOT NULL");
    }

    #[test]
    fn deleted_filter_without_marker_column_fails() {
        let spec = Specification::<Counter>::new().deleted(DeletedFilter::OnlyDeleted);
        let err = spec
            .apply_to(QueryBuilder::new("counters"))
            .build_select("*")
            .unwrap_err();
        assert!(err.is_validation());

        let include = Specification::<Counter>::new();
        assert!(include
            .apply_to(QueryBuilder::new("counters"))
            .build_select("*")
            .is_ok());
    }
}
