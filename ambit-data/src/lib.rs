//! Data access core for Ambit.
//!
//! Backend-neutral building blocks shared by the repository implementations:
//!
//! | Module          | Provides |
//! |-----------------|----------|
//! | [`field`]       | identifier allow-list for dynamic field names |
//! | [`query`]       | `QueryBuilder` with dialect-aware SQL rendering |
//! | [`scope`]       | composable query modifiers (paginate, order, filter, lock) |
//! | [`deleted`]     | soft-delete visibility policy |
//! | [`context`]     | explicit execution context carrying the transaction |
//! | [`transactor`]  | begin/commit/rollback and the nesting protocol |
//! | [`repository`]  | the generic `Repository<T>` contract |
//!
//! See `ambit-data-sqlx` for the sqlx-backed implementation.

pub mod base;
pub mod context;
pub mod deleted;
pub mod entity;
pub mod error;
pub mod field;
pub mod page;
pub mod query;
pub mod repository;
pub mod scope;
pub mod specification;
pub mod transactor;
pub mod value;

pub use base::BaseEntity;
pub use context::Context;
pub use deleted::DeletedFilter;
pub use entity::Entity;
pub use error::DataError;
pub use field::is_valid_field_name;
pub use page::{Page, Pageable};
pub use query::{Dialect, IdentifierPolicy, QueryBuilder};
pub use repository::Repository;
pub use scope::{BoxScope, Scope};
pub use specification::{Filter, Specification};
pub use transactor::Transactor;
pub use value::{Timestamp, Value};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::scope;
    pub use crate::{
        BaseEntity, Context, DataError, DeletedFilter, Entity, Filter, Page, Pageable,
        QueryBuilder, Repository, Specification, Timestamp, Transactor, Value,
    };
}
