use std::future::Future;

use crate::context::Context;
use crate::entity::Entity;
use crate::error::DataError;
use crate::page::{Page, Pageable};
use crate::specification::Specification;

/// Transaction-aware CRUD over one entity type.
///
/// Every call resolves its connection from `ctx`: the ambient transaction
/// when there is one, a pooled connection otherwise.
///
/// Uses RPITIT (return-position `impl Trait` in traits); no `async-trait` needed.
pub trait Repository<T: Entity>: Send + Sync {
    /// Insert `model` and return it as stored, with engine-assigned columns.
    fn insert(&self, ctx: &Context, model: T) -> impl Future<Output = Result<T, DataError>> + Send;

    fn find_all(
        &self,
        ctx: &Context,
        spec: &Specification<T>,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    /// The first match in default order, or `T::default()` when nothing
    /// matches.
    fn find_first(
        &self,
        ctx: &Context,
        spec: &Specification<T>,
    ) -> impl Future<Output = Result<T, DataError>> + Send;

    /// Save every column of `model`. A model without an id, or one whose row
    /// no longer exists, is inserted instead.
    fn update(&self, ctx: &Context, model: T) -> impl Future<Output = Result<T, DataError>> + Send;

    /// Hard-delete `model` by id, ignoring any soft-delete marker.
    fn delete(&self, ctx: &Context, model: &T) -> impl Future<Output = Result<(), DataError>> + Send;

    fn insert_many(
        &self,
        ctx: &Context,
        models: Vec<T>,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn delete_many(
        &self,
        ctx: &Context,
        models: &[T],
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    fn save_many(
        &self,
        ctx: &Context,
        models: Vec<T>,
    ) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;

    fn count(
        &self,
        ctx: &Context,
        spec: &Specification<T>,
    ) -> impl Future<Output = Result<u64, DataError>> + Send;

    fn find_page(
        &self,
        ctx: &Context,
        spec: &Specification<T>,
        pageable: &Pageable,
    ) -> impl Future<Output = Result<Page<T>, DataError>> + Send;
}

/// Reject the entity's zero value.
pub fn check_zero_value<T: Entity>(model: &T) -> Result<(), DataError> {
    if model.is_zero() {
        return Err(DataError::validation("model cannot be zero value"));
    }
    Ok(())
}

/// Reject an empty batch. `what` names the batch, as in "inserted models".
pub fn check_not_empty<T>(models: &[T], what: &str) -> Result<(), DataError> {
    if models.is_empty() {
        return Err(DataError::validation(format!("{what} cannot be empty")));
    }
    Ok(())
}
