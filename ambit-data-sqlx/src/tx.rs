//! Transactions carried in an [`ambit_data::Context`].
//!
//! [`SqlxTransactor::begin`] stores a [`TxHandle`] in the context it returns.
//! Repositories look the handle up on every call, so everything run with
//! that context (or a context derived from it) shares one transaction.

use std::sync::Arc;

use ambit_data::{Context, DataError, Dialect, Transactor};
use sqlx::{Any, AnyPool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) type TxSlot = Option<Transaction<'static, Any>>;

/// Shared handle to an open transaction.
///
/// Cloning shares the transaction. Commit and rollback take the transaction
/// out of the handle; from then on the handle is *finished*.
#[derive(Clone)]
pub struct TxHandle {
    id: Uuid,
    dialect: Dialect,
    slot: Arc<Mutex<TxSlot>>,
}

impl TxHandle {
    fn new(tx: Transaction<'static, Any>, dialect: Dialect) -> Self {
        Self {
            id: Uuid::new_v4(),
            dialect,
            slot: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Identifier used in log records.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub async fn is_finished(&self) -> bool {
        self.slot.lock().await.is_none()
    }

    /// Exclusive access to the transaction for one statement.
    pub(crate) async fn lock(&self) -> OwnedMutexGuard<TxSlot> {
        self.slot.clone().lock_owned().await
    }

    async fn take(&self) -> TxSlot {
        self.slot.lock().await.take()
    }
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// The transaction handle carried by `ctx`, if any.
pub fn tx_from_context(ctx: &Context) -> Result<Option<&TxHandle>, DataError> {
    ctx.transaction::<TxHandle>()
}

/// [`Transactor`] over an `AnyPool`.
///
/// # Example
///
/// ```ignore
/// let transactor = SqlxTransactor::new(pool.clone());
/// transactor
///     .within_transaction(&ctx, |ctx| async move {
///         accounts.update(&ctx, debit).await?;
///         accounts.update(&ctx, credit).await?;
///         Ok::<_, DataError>(())
///     })
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct SqlxTransactor {
    pool: AnyPool,
}

impl SqlxTransactor {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

impl Transactor for SqlxTransactor {
    async fn begin(&self, ctx: &Context) -> Result<Context, DataError> {
        let tx = ctx
            .run(self.pool.begin())
            .await
            .map_err(DataError::transaction)?
            .map_err(DataError::transaction)?;
        let dialect = Dialect::from_backend_name(tx.backend_name());
        let handle = TxHandle::new(tx, dialect);
        debug!(tx_id = %handle.id(), ?dialect, "transaction started");
        Ok(ctx.with_transaction(handle))
    }

    async fn commit(&self, ctx: &Context) -> Result<(), DataError> {
        let Some(handle) = tx_from_context(ctx)? else {
            return Ok(());
        };
        let tx = handle
            .take()
            .await
            .ok_or_else(|| DataError::transaction(DataError::TransactionFinished))?;
        tx.commit().await.map_err(DataError::transaction)?;
        debug!(tx_id = %handle.id(), "transaction committed");
        Ok(())
    }

    async fn rollback(&self, ctx: &Context) {
        let handle = match tx_from_context(ctx) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!("no transaction is running");
                return;
            }
            Err(err) => {
                warn!(error = %err, "cannot roll back");
                return;
            }
        };
        match handle.take().await {
            None => debug!(tx_id = %handle.id(), "transaction already finished"),
            Some(tx) => match tx.rollback().await {
                Ok(()) => debug!(tx_id = %handle.id(), "transaction rolled back"),
                Err(err) => warn!(tx_id = %handle.id(), error = %err, "error rolling back transaction"),
            },
        }
    }

    fn in_transaction(&self, ctx: &Context) -> Result<bool, DataError> {
        Ok(tx_from_context(ctx)?.is_some())
    }
}
