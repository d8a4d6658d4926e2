//! # ambit-data-sqlx: SQLx backend for the Ambit data layer
//!
//! This crate provides the [SQLx](https://github.com/launchbadge/sqlx)-specific
//! implementations for Ambit's data access layer. It depends on [`ambit_data`]
//! for the abstract traits and types, and adds the repository, the transactor,
//! and the error bridging needed to talk to a real database through the
//! `sqlx::Any` driver.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SqlxRepository`] | `Repository<T>` over an `AnyPool`, transaction-aware |
//! | [`SqlxTransactor`] | `Transactor` storing a [`TxHandle`] in the context |
//! | [`Connection`] | The connection a context resolves to (transaction or pool) |
//! | [`SqlxEntity`] / [`RelationLoader`] | Row mapping and relation preloading |
//! | [`DatabaseConfig`] / [`connect`] | Pool settings from YAML, `.env` and environment |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error(..)`) |
//!
//! # Feature flags
//!
//! Enable the drivers your URLs need:
//!
//! | Feature    | Driver |
//! |------------|--------|
//! | `sqlite`   | SQLite via `sqlx/sqlite` |
//! | `postgres` | PostgreSQL via `sqlx/postgres` |
//! | `mysql`    | MySQL via `sqlx/mysql` |
//!
//! # Transactions
//!
//! | Situation                                  | Behaviour |
//! |--------------------------------------------|-----------|
//! | repository call, no transaction in context | runs on a pooled connection |
//! | repository call inside `within_transaction` | runs on the transaction |
//! | nested `within_transaction`                | joins the outer transaction |
//! | batch call, no transaction in context      | runs in its own transaction |
//!
//! ```ignore
//! use ambit_data::prelude::*;
//! use ambit_data_sqlx::{connect, DatabaseConfig, SqlxRepository, SqlxTransactor};
//!
//! let config = DatabaseConfig::load("dev")?;
//! let pool = connect(&config).await?;
//! let accounts = SqlxRepository::<Account>::from_config(pool.clone(), &config);
//! let transactor = SqlxTransactor::new(pool);
//!
//! transactor
//!     .within_transaction(&Context::background(), |ctx| async move {
//!         accounts.update(&ctx, debit).await?;
//!         accounts.update(&ctx, credit).await?;
//!         Ok::<_, DataError>(())
//!     })
//!     .await?;
//! ```
//!
//! # Error bridging
//!
//! Due to Rust's orphan rules, `From<sqlx::Error> for DataError` can't be
//! implemented here. Use the [`SqlxErrorExt`] trait instead:
//!
//! ```ignore
//! use ambit_data_sqlx::SqlxErrorExt;
//!
//! sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
//!     .bind(now)
//!     .execute(&pool)
//!     .await
//!     .map_err(|e| e.into_data_error("error purging sessions"))?;
//! ```

mod bind;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod preload;
pub mod repository;
pub mod tx;

pub use config::{ConfigError, DatabaseConfig};
pub use connection::Connection;
pub use error::SqlxErrorExt;
pub use pool::connect;
pub use preload::{unknown_relation, RelationLoader, SqlxEntity};
pub use repository::SqlxRepository;
pub use tx::{tx_from_context, SqlxTransactor, TxHandle};

/// Re-exports of the most commonly used types from both `ambit-data` and this crate.
pub mod prelude {
    pub use crate::{
        connect, DatabaseConfig, RelationLoader, SqlxEntity, SqlxErrorExt, SqlxRepository,
        SqlxTransactor,
    };
    pub use ambit_data::prelude::*;
}
