//! Context-propagated transactions with transparent nesting.
//!
//! | Call                 | No handle in ctx             | Handle in ctx                 |
//! |----------------------|------------------------------|-------------------------------|
//! | `begin`              | opens one, returns new ctx   | opens another (avoid)         |
//! | `commit`             | no-op                        | commits, finishes the handle  |
//! | `rollback`           | logged no-op                 | rolls back, finishes handle   |
//! | `within_transaction` | begin, run, commit           | runs the closure as-is        |

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::context::Context;
use crate::error::DataError;

/// Opens, commits and rolls back transactions carried in a [`Context`].
///
/// Uses RPITIT (return-position `impl Trait` in traits), so implementations
/// write plain `async` bodies.
pub trait Transactor: Send + Sync {
    /// Open a transaction and return a context carrying its handle.
    ///
    /// Failures are [`DataError::Transaction`].
    fn begin(&self, ctx: &Context) -> impl Future<Output = Result<Context, DataError>> + Send;

    /// Commit the transaction in `ctx`. Succeeds trivially without one.
    fn commit(&self, ctx: &Context) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Roll back the transaction in `ctx`. Never fails: a missing or already
    /// finished transaction is ignored and anything else is logged.
    fn rollback(&self, ctx: &Context) -> impl Future<Output = ()> + Send;

    /// Whether `ctx` carries a transaction handle this transactor understands.
    fn in_transaction(&self, ctx: &Context) -> Result<bool, DataError>;

    /// Run `f` inside a transaction.
    ///
    /// If `ctx` already carries one, `f` joins it and this call neither
    /// commits nor rolls back. Otherwise a transaction is opened, `f` runs
    /// with the derived context, and the transaction is committed when `f`
    /// returns `Ok` or rolled back when it returns `Err` or panics. A panic
    /// resumes after the rollback.
    fn within_transaction<F, Fut, R, E>(
        &self,
        ctx: &Context,
        f: F,
    ) -> impl Future<Output = Result<R, E>> + Send
    where
        F: FnOnce(Context) -> Fut + Send,
        Fut: Future<Output = Result<R, E>> + Send,
        R: Send,
        E: From<DataError> + Send,
    {
        async move {
            if self.in_transaction(ctx)? {
                return f(ctx.clone()).await;
            }

            let tx_ctx = self.begin(ctx).await?;
            let outcome = AssertUnwindSafe(f(tx_ctx.clone())).catch_unwind().await;
            let result = match outcome {
                Ok(Ok(value)) => self.commit(&tx_ctx).await.map(|()| value).map_err(E::from),
                Ok(Err(err)) => Err(err),
                Err(panic) => {
                    self.rollback(&tx_ctx).await;
                    std::panic::resume_unwind(panic);
                }
            };
            // No-op after a successful commit.
            self.rollback(&tx_ctx).await;
            result
        }
    }
}
