use std::marker::PhantomData;

use ambit_data::repository::{check_not_empty, check_zero_value};
use ambit_data::{
    Context, DataError, Entity, IdentifierPolicy, Page, Pageable, QueryBuilder, Repository, Scope,
    Specification, Timestamp, Transactor, Value,
};
use sqlx::AnyPool;
use tracing::debug;

use crate::bind::arguments;
use crate::config::DatabaseConfig;
use crate::connection::Connection;
use crate::error::SqlxErrorExt;
use crate::preload::{RelationLoader, SqlxEntity};
use crate::tx::SqlxTransactor;

/// A generic repository over an `AnyPool`.
///
/// Every call runs on the transaction carried by its [`Context`], or on a
/// pooled connection when there is none.
///
/// # Example
///
/// ```ignore
/// let repo = SqlxRepository::<User>::new(pool.clone());
/// let user = repo.insert(&ctx, User::new("alice")).await?;
/// let active = repo
///     .find_all(&ctx, &Specification::new().deleted(DeletedFilter::ExcludeDeleted))
///     .await?;
/// ```
pub struct SqlxRepository<T> {
    pool: AnyPool,
    identifier_policy: IdentifierPolicy,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqlxRepository<T> {
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            identifier_policy: IdentifierPolicy::default(),
            _marker: PhantomData,
        }
    }

    /// A repository using the identifier policy of `config`
    /// (`datasource.identifier-quoting`).
    ///
    /// ```ignore
    /// let config = DatabaseConfig::load("prod")?;
    /// let pool = connect(&config).await?;
    /// let users = SqlxRepository::<User>::from_config(pool, &config);
    /// ```
    pub fn from_config(pool: AnyPool, config: &DatabaseConfig) -> Self {
        Self::new(pool).with_identifier_policy(config.identifier_policy())
    }

    /// Quote identifiers in generated SQL instead of only validating them.
    pub fn with_identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    pub fn identifier_policy(&self) -> IdentifierPolicy {
        self.identifier_policy
    }

    /// Get the underlying pool reference.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// A transactor over the same pool.
    pub fn transactor(&self) -> SqlxTransactor {
        SqlxTransactor::new(self.pool.clone())
    }

    /// The connection calls with `ctx` run on: the ambient transaction, or a
    /// pooled connection.
    ///
    /// A transaction-backed connection holds the transaction exclusively.
    /// Until it is dropped, every other call on a context carrying the same
    /// transaction waits for it (bounded only by that context's deadline or
    /// cancellation), and so does commit.
    pub async fn get_connection(&self, ctx: &Context) -> Result<Connection, DataError> {
        Connection::acquire(&self.pool, ctx).await
    }
}

impl<T> Clone for SqlxRepository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            identifier_policy: self.identifier_policy,
            _marker: PhantomData,
        }
    }
}

impl<T: SqlxEntity> SqlxRepository<T> {
    fn query(&self, conn: &Connection) -> QueryBuilder {
        QueryBuilder::new_with_dialect(T::table_name(), conn.dialect())
            .identifier_policy(self.identifier_policy)
    }

    fn by_id(&self, conn: &Connection, id: Value) -> QueryBuilder {
        self.query(conn).where_eq(T::id_column(), id)
    }

    /// [`Repository::find_all`] followed by a caller scope (pagination,
    /// ordering, time ranges).
    pub async fn find_all_with(
        &self,
        ctx: &Context,
        spec: &Specification<T>,
        scope: impl Scope,
    ) -> Result<Vec<T>, DataError> {
        let mut conn = self.get_connection(ctx).await?;
        let query = spec.apply_to(self.query(&conn)).scope(scope);
        self.fetch_all(ctx, &mut conn, query).await
    }

    /// Set the soft-delete marker on `model`'s row.
    pub async fn soft_delete(&self, ctx: &Context, model: &T) -> Result<(), DataError> {
        self.set_deleted(ctx, model, Value::from(Timestamp::now())).await
    }

    /// Clear the soft-delete marker on `model`'s row.
    pub async fn restore(&self, ctx: &Context, model: &T) -> Result<(), DataError> {
        self.set_deleted(ctx, model, Value::Null).await
    }

    async fn set_deleted(&self, ctx: &Context, model: &T, marker: Value) -> Result<(), DataError> {
        check_zero_value(model)?;
        let Some(column) = T::deleted_at_column() else {
            return Err(DataError::validation(format!(
                "entity {} has no deleted marker column",
                T::table_name()
            )));
        };
        let id = require_id(model)?;
        let mut conn = self.get_connection(ctx).await?;
        let (sql, params) = self.by_id(&conn, id).build_update(vec![(column, marker)])?;
        self.execute(ctx, &mut conn, &sql, params, "error updating data")
            .await?;
        Ok(())
    }

    async fn fetch_all(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        query: QueryBuilder,
    ) -> Result<Vec<T>, DataError> {
        let (sql, params) = query.build_select("*")?;
        debug!(sql = %sql, tx_id = ?conn.tx_id(), "query");
        let args = arguments(params)?;
        let executor = conn.executor()?;
        let mut models = ctx
            .run(sqlx::query_as_with::<_, T, _>(&sql, args).fetch_all(executor))
            .await?
            .map_err(|e| e.into_data_error("error querying data"))?;
        self.preload(ctx, conn, &mut models, query.preloads()).await?;
        Ok(models)
    }

    async fn fetch_optional(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        sql: &str,
        params: Vec<Value>,
        context: &'static str,
    ) -> Result<Option<T>, DataError> {
        debug!(sql = %sql, tx_id = ?conn.tx_id(), "query");
        let args = arguments(params)?;
        let executor = conn.executor()?;
        ctx.run(sqlx::query_as_with::<_, T, _>(sql, args).fetch_optional(executor))
            .await?
            .map_err(|e| e.into_data_error(context))
    }

    async fn execute(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        sql: &str,
        params: Vec<Value>,
        context: &'static str,
    ) -> Result<sqlx::any::AnyQueryResult, DataError> {
        debug!(sql = %sql, tx_id = ?conn.tx_id(), "execute");
        let args = arguments(params)?;
        let executor = conn.executor()?;
        ctx.run(sqlx::query_with(sql, args).execute(executor))
            .await?
            .map_err(|e| e.into_data_error(context))
    }

    async fn preload(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        models: &mut [T],
        relations: &[String],
    ) -> Result<(), DataError> {
        for relation in relations {
            if !ambit_data::is_valid_field_name(relation) {
                return Err(DataError::validation(format!(
                    "invalid relation name: {relation}"
                )));
            }
            let mut loader = RelationLoader::new(ctx, conn, self.identifier_policy);
            T::preload(models, relation, &mut loader).await?;
        }
        Ok(())
    }

    async fn insert_on(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        mut model: T,
    ) -> Result<T, DataError> {
        model.before_insert();
        let values = model.values_with_id();
        let query = self.query(conn);

        if conn.dialect().supports_returning() {
            let (sql, params) = query.returning().build_insert(values)?;
            return self
                .fetch_optional(ctx, conn, &sql, params, "error inserting data")
                .await?
                .ok_or_else(|| DataError::engine("error inserting data", "no row returned"));
        }

        let (sql, params) = query.build_insert(values)?;
        let result = self
            .execute(ctx, conn, &sql, params, "error inserting data")
            .await?;
        let id = match model.id() {
            Value::Null => result
                .last_insert_id()
                .map(Value::Int)
                .ok_or_else(|| DataError::engine("error inserting data", "no id generated"))?,
            id => id,
        };
        self.reload(ctx, conn, id, "error inserting data").await
    }

    async fn save_on(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        mut model: T,
    ) -> Result<T, DataError> {
        let id = model.id();
        if id.is_null() {
            return self.insert_on(ctx, conn, model).await;
        }
        model.before_update();
        let query = self.by_id(conn, id.clone());

        if conn.dialect().supports_returning() {
            let (sql, params) = query.returning().build_update(model.values())?;
            return match self
                .fetch_optional(ctx, conn, &sql, params, "error updating data")
                .await?
            {
                Some(saved) => Ok(saved),
                None => self.insert_on(ctx, conn, model).await,
            };
        }

        let (sql, params) = query.build_update(model.values())?;
        let result = self
            .execute(ctx, conn, &sql, params, "error updating data")
            .await?;
        if result.rows_affected() == 0 {
            return self.insert_on(ctx, conn, model).await;
        }
        self.reload(ctx, conn, id, "error updating data").await
    }

    async fn reload(
        &self,
        ctx: &Context,
        conn: &mut Connection,
        id: Value,
        context: &'static str,
    ) -> Result<T, DataError> {
        let (sql, params) = self.by_id(conn, id).limit(1).build_select("*")?;
        self.fetch_optional(ctx, conn, &sql, params, context)
            .await?
            .ok_or_else(|| DataError::engine(context, "written row not found"))
    }
}

/// The model's id, or a validation error if the engine has not assigned one.
fn require_id<T: Entity>(model: &T) -> Result<Value, DataError> {
    match model.id() {
        Value::Null => Err(DataError::validation(format!(
            "{} model has no {}",
            T::table_name(),
            T::id_column()
        ))),
        id => Ok(id),
    }
}

impl<T: SqlxEntity> Repository<T> for SqlxRepository<T> {
    async fn insert(&self, ctx: &Context, model: T) -> Result<T, DataError> {
        check_zero_value(&model)?;
        let mut conn = self.get_connection(ctx).await?;
        self.insert_on(ctx, &mut conn, model).await
    }

    async fn find_all(&self, ctx: &Context, spec: &Specification<T>) -> Result<Vec<T>, DataError> {
        let mut conn = self.get_connection(ctx).await?;
        let query = spec.apply_to(self.query(&conn));
        self.fetch_all(ctx, &mut conn, query).await
    }

    async fn find_first(&self, ctx: &Context, spec: &Specification<T>) -> Result<T, DataError> {
        let mut conn = self.get_connection(ctx).await?;
        let query = spec.apply_to(self.query(&conn)).limit(1);
        let first = self.fetch_all(ctx, &mut conn, query).await?.into_iter().next();
        Ok(first.unwrap_or_default())
    }

    async fn update(&self, ctx: &Context, model: T) -> Result<T, DataError> {
        check_zero_value(&model)?;
        let mut conn = self.get_connection(ctx).await?;
        self.save_on(ctx, &mut conn, model).await
    }

    async fn delete(&self, ctx: &Context, model: &T) -> Result<(), DataError> {
        check_zero_value(model)?;
        let id = require_id(model)?;
        let mut conn = self.get_connection(ctx).await?;
        let (sql, params) = self.by_id(&conn, id).build_delete()?;
        self.execute(ctx, &mut conn, &sql, params, "error deleting data")
            .await?;
        Ok(())
    }

    async fn insert_many(&self, ctx: &Context, models: Vec<T>) -> Result<Vec<T>, DataError> {
        check_not_empty(&models, "inserted models")?;
        self.transactor()
            .within_transaction(ctx, |ctx| async move {
                let mut conn = self.get_connection(&ctx).await?;
                let mut inserted = Vec::with_capacity(models.len());
                for model in models {
                    inserted.push(self.insert_on(&ctx, &mut conn, model).await?);
                }
                Ok::<_, DataError>(inserted)
            })
            .await
    }

    async fn delete_many(&self, ctx: &Context, models: &[T]) -> Result<(), DataError> {
        check_not_empty(models, "deleted models")?;
        let ids = models.iter().map(require_id).collect::<Result<Vec<_>, _>>()?;
        self.transactor()
            .within_transaction(ctx, |ctx| async move {
                let mut conn = self.get_connection(&ctx).await?;
                let (sql, params) = self.query(&conn).where_in(T::id_column(), ids).build_delete()?;
                self.execute(&ctx, &mut conn, &sql, params, "error batch deleting data")
                    .await?;
                Ok::<_, DataError>(())
            })
            .await
    }

    async fn save_many(&self, ctx: &Context, models: Vec<T>) -> Result<Vec<T>, DataError> {
        check_not_empty(&models, "saved models")?;
        self.transactor()
            .within_transaction(ctx, |ctx| async move {
                let mut conn = self.get_connection(&ctx).await?;
                let mut saved = Vec::with_capacity(models.len());
                for model in models {
                    saved.push(self.save_on(&ctx, &mut conn, model).await?);
                }
                Ok::<_, DataError>(saved)
            })
            .await
    }

    async fn count(&self, ctx: &Context, spec: &Specification<T>) -> Result<u64, DataError> {
        let mut conn = self.get_connection(ctx).await?;
        let (sql, params) = spec.apply_filter(self.query(&conn)).build_count()?;
        debug!(sql = %sql, tx_id = ?conn.tx_id(), "count");
        let args = arguments(params)?;
        let executor = conn.executor()?;
        let total: i64 = ctx
            .run(sqlx::query_scalar_with::<_, i64, _>(&sql, args).fetch_one(executor))
            .await?
            .map_err(|e| e.into_data_error("error counting data"))?;
        Ok(total.max(0) as u64)
    }

    async fn find_page(
        &self,
        ctx: &Context,
        spec: &Specification<T>,
        pageable: &Pageable,
    ) -> Result<Page<T>, DataError> {
        let total = self.count(ctx, spec).await?;
        let mut conn = self.get_connection(ctx).await?;
        // The requested sort goes first; the default order only breaks ties.
        let query = spec.apply_to(pageable.apply(self.query(&conn)));
        let content = self.fetch_all(ctx, &mut conn, query).await?;
        Ok(Page::new(content, pageable, total))
    }
}
