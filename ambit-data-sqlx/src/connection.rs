use ambit_data::{Context, DataError, Dialect};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::SqlxErrorExt;
use crate::tx::{tx_from_context, TxSlot};

/// A connection resolved from a [`Context`]: the ambient transaction when
/// there is one, otherwise a connection checked out of the pool.
///
/// A transaction-backed connection holds the transaction exclusively until
/// it is dropped. Drop it before committing.
pub struct Connection {
    kind: Kind,
    dialect: Dialect,
    tx_id: Option<Uuid>,
}

enum Kind {
    Pooled(PoolConnection<Any>),
    Transaction(OwnedMutexGuard<TxSlot>),
}

impl Connection {
    /// Resolve the connection for `ctx`. Waiting for the transaction or for
    /// a pooled connection honours the context's cancellation and deadline.
    pub async fn acquire(pool: &AnyPool, ctx: &Context) -> Result<Self, DataError> {
        if let Some(handle) = tx_from_context(ctx)? {
            let guard = ctx.run(handle.lock()).await?;
            return Ok(Self {
                kind: Kind::Transaction(guard),
                dialect: handle.dialect(),
                tx_id: Some(handle.id()),
            });
        }
        let conn = ctx
            .run(pool.acquire())
            .await?
            .map_err(|e| e.into_data_error("error acquiring connection"))?;
        let dialect = Dialect::from_backend_name(conn.backend_name());
        Ok(Self {
            kind: Kind::Pooled(conn),
            dialect,
            tx_id: None,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.kind, Kind::Transaction(_))
    }

    /// Id of the transaction this connection belongs to.
    pub fn tx_id(&self) -> Option<Uuid> {
        self.tx_id
    }

    /// The connection to run statements on.
    ///
    /// Fails with [`DataError::TransactionFinished`] if the ambient
    /// transaction was already committed or rolled back.
    pub fn executor(&mut self) -> Result<&mut AnyConnection, DataError> {
        match &mut self.kind {
            Kind::Pooled(conn) => Ok(&mut **conn),
            Kind::Transaction(guard) => match (**guard).as_mut() {
                Some(tx) => Ok(&mut **tx),
                None => Err(DataError::TransactionFinished),
            },
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("dialect", &self.dialect)
            .field("tx_id", &self.tx_id)
            .finish()
    }
}
