//! Eager loading of relations named in a specification.
//!
//! The repository runs the main query, then hands the loaded rows to
//! [`SqlxEntity::preload`] once per relation name. Implementations match on
//! the name and use [`RelationLoader::fetch_by`] to load the related rows on
//! the same connection (and therefore inside the same transaction).
//!
//! ```ignore
//! impl SqlxEntity for Author {
//!     async fn preload(
//!         authors: &mut [Self],
//!         relation: &str,
//!         loader: &mut RelationLoader<'_>,
//!     ) -> Result<(), DataError> {
//!         match relation {
//!             "Books" => {
//!                 let ids = authors.iter().map(|a| a.id.into()).collect();
//!                 let books: Vec<Book> = loader.fetch_by("author_id", ids).await?;
//!                 for author in authors.iter_mut() {
//!                     author.books = books.iter().filter(|b| b.author_id == author.id).cloned().collect();
//!                 }
//!                 Ok(())
//!             }
//!             other => Err(unknown_relation::<Self>(other)),
//!         }
//!     }
//! }
//! ```

use std::future::Future;

use ambit_data::{Context, DataError, Entity, IdentifierPolicy, QueryBuilder, Value};
use sqlx::any::AnyRow;
use sqlx::FromRow;
use tracing::debug;

use crate::bind::arguments;
use crate::connection::Connection;
use crate::error::SqlxErrorExt;

/// An [`Entity`] that can be read from an `AnyRow` and knows its relations.
pub trait SqlxEntity: Entity + for<'r> FromRow<'r, AnyRow> {
    /// Populate `relation` on every model in `models`.
    ///
    /// The default knows no relations.
    fn preload(
        models: &mut [Self],
        relation: &str,
        loader: &mut RelationLoader<'_>,
    ) -> impl Future<Output = Result<(), DataError>> + Send {
        let _ = (models, loader);
        let err = unknown_relation::<Self>(relation);
        async move { Err(err) }
    }
}

/// The error for a relation name `T` does not define.
pub fn unknown_relation<T: Entity>(relation: &str) -> DataError {
    DataError::UnknownRelation {
        entity: T::table_name(),
        relation: relation.to_string(),
    }
}

/// Loads related rows on the connection of the query being preloaded.
pub struct RelationLoader<'c> {
    ctx: &'c Context,
    conn: &'c mut Connection,
    identifier_policy: IdentifierPolicy,
}

impl<'c> RelationLoader<'c> {
    pub(crate) fn new(
        ctx: &'c Context,
        conn: &'c mut Connection,
        identifier_policy: IdentifierPolicy,
    ) -> Self {
        Self {
            ctx,
            conn,
            identifier_policy,
        }
    }

    /// Rows of `C` whose `column` is one of `keys`, oldest first. Soft-deleted
    /// rows are skipped. Duplicate and null keys are dropped.
    pub async fn fetch_by<C: SqlxEntity>(
        &mut self,
        column: &str,
        keys: Vec<Value>,
    ) -> Result<Vec<C>, DataError> {
        let mut unique: Vec<Value> = Vec::with_capacity(keys.len());
        for key in keys {
            if !key.is_null() && !unique.contains(&key) {
                unique.push(key);
            }
        }
        let mut query = QueryBuilder::new_with_dialect(C::table_name(), self.conn.dialect())
            .identifier_policy(self.identifier_policy)
            .where_in(column, unique);
        if let Some(deleted) = C::deleted_at_column() {
            query = query.where_null(deleted);
        }
        let (sql, params) = query
            .order_by(C::created_at_column(), true)
            .build_select("*")?;
        debug!(sql = %sql, "preload");
        let args = arguments(params)?;
        let executor = self.conn.executor()?;
        self.ctx
            .run(sqlx::query_as_with::<_, C, _>(&sql, args).fetch_all(executor))
            .await?
            .map_err(|e| e.into_data_error("error preloading relation"))
    }
}
