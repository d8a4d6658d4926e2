use serde::{Deserialize, Serialize};

use crate::query::{Condition, QueryBuilder};

/// Visibility of soft-deleted rows for a query.
///
/// The default (an unset policy) applies no filter, the same as
/// [`DeletedFilter::IncludeDeleted`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedFilter {
    /// Only rows whose deleted marker is `NULL`.
    ExcludeDeleted,
    /// Every row, deleted or not.
    #[default]
    IncludeDeleted,
    /// Only rows whose deleted marker is set.
    OnlyDeleted,
}

impl DeletedFilter {
    /// The `WHERE` fragment for `column`, or `None` when no filter applies.
    pub fn condition(self, column: &str) -> Option<Condition> {
        match self {
            DeletedFilter::ExcludeDeleted => Some(Condition::IsNull(column.to_string())),
            DeletedFilter::IncludeDeleted => None,
            DeletedFilter::OnlyDeleted => Some(Condition::IsNotNull(column.to_string())),
        }
    }

    /// Apply the policy to `query` against the given marker column.
    pub fn apply(self, query: QueryBuilder, column: &str) -> QueryBuilder {
        match self.condition(column) {
            Some(cond) => query.push_condition(cond),
            None => query,
        }
    }
}
