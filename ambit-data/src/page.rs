use serde::{Deserialize, Serialize};

use crate::query::QueryBuilder;
use crate::scope;

/// A 1-indexed page request.
///
/// `sort` is `field` or `field,asc` / `field,desc`; the field goes through
/// the same validation as [`scope::order_by`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: u64,
    #[serde(default)]
    pub sort: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> u64 {
    20
}

impl Default for Pageable {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_page_size(),
            sort: None,
        }
    }
}

impl Pageable {
    pub fn new(page: i64, size: u64) -> Self {
        Self {
            page,
            size,
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1).saturating_mul(self.size)
    }

    /// Requested ordering followed by `LIMIT`/`OFFSET`.
    pub fn apply(&self, query: QueryBuilder) -> QueryBuilder {
        let query = match self.sort.as_deref() {
            Some(sort) => {
                let (field, direction) = match sort.split_once(',') {
                    Some((field, direction)) => (field.trim(), direction.trim()),
                    None => (sort.trim(), "asc"),
                };
                if direction.eq_ignore_ascii_case("asc") {
                    query.scope(scope::order_by(field, true))
                } else if direction.eq_ignore_ascii_case("desc") {
                    query.scope(scope::order_by(field, false))
                } else {
                    query.fail(format!("invalid sort direction: {direction}"))
                }
            }
            None => query,
        };
        query.scope(scope::paginate(self.page, self.size))
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pageable: &Pageable, total_elements: u64) -> Self {
        let total_pages = if pageable.size == 0 {
            0
        } else {
            total_elements.div_ceil(pageable.size)
        };
        Self {
            content,
            page: pageable.page.max(1),
            size: pageable.size,
            total_elements,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages
    }
}
