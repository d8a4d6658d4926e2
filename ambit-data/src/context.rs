//! Explicit, immutable execution context.
//!
//! A [`Context`] is passed by reference to every repository and transactor
//! call. Deriving a context (`with_*`) never mutates the parent, so a
//! transaction attached for one call chain is invisible to its siblings.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DataError;

type AnyValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct Context {
    values: Arc<HashMap<TypeId, AnyValue>>,
    transaction: Option<AnyValue>,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// The root context: no values, no transaction, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// A new context carrying `value`, replacing any earlier value of the
    /// same type.
    pub fn with_value<V: Any + Send + Sync>(&self, value: V) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<V>(), Arc::new(value));
        Self {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    pub fn value<V: Any + Send + Sync>(&self) -> Option<&V> {
        self.values
            .get(&TypeId::of::<V>())
            .and_then(|v| v.downcast_ref::<V>())
    }

    /// A new context holding `handle` in the transaction slot.
    pub fn with_transaction<H: Any + Send + Sync>(&self, handle: H) -> Self {
        Self {
            transaction: Some(Arc::new(handle)),
            ..self.clone()
        }
    }

    /// A new context with the transaction slot cleared.
    pub fn without_transaction(&self) -> Self {
        Self {
            transaction: None,
            ..self.clone()
        }
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// The active transaction handle, if any.
    ///
    /// Fails with [`DataError::Context`] when the slot holds a handle of
    /// another type.
    pub fn transaction<H: Any + Send + Sync>(&self) -> Result<Option<&H>, DataError> {
        match &self.transaction {
            None => Ok(None),
            Some(handle) => handle.downcast_ref::<H>().map(Some).ok_or_else(|| {
                DataError::Context(format!(
                    "transaction slot does not hold a {}",
                    std::any::type_name::<H>()
                ))
            }),
        }
    }

    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// A new context expiring at `deadline`, or at the parent's deadline if
    /// that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), DataError> {
        if self.is_cancelled() {
            return Err(DataError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(DataError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first. The losing future is dropped.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, DataError> {
        self.check()?;
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancelled => Err(DataError::Cancelled),
            _ = expired => Err(DataError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values.len())
            .field("transaction", &self.transaction.is_some())
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct RequestId(&'static str);

    #[derive(Debug)]
    struct FakeTx(u32);

    #[test]
    fn values_are_append_only() {
        let root = Context::background();
        let child = root.with_value(RequestId("a"));
        let grandchild = child.with_value(RequestId("b"));
        assert!(root.value::<RequestId>().is_none());
        assert_eq!(child.value::<RequestId>(), Some(&RequestId("a")));
        assert_eq!(grandchild.value::<RequestId>(), Some(&RequestId("b")));
    }

    #[test]
    fn transaction_slot() {
        let root = Context::background();
        assert!(!root.has_transaction());
        assert!(root.transaction::<FakeTx>().unwrap().is_none());

        let tx = root.with_transaction(FakeTx(7));
        assert!(tx.has_transaction());
        assert!(!root.has_transaction());
        assert_eq!(tx.transaction::<FakeTx>().unwrap().unwrap().0, 7);
        assert!(!tx.without_transaction().has_transaction());
    }

    #[test]
    fn wrong_handle_type_is_a_context_error() {
        let ctx = Context::background().with_transaction(FakeTx(1));
        let err = ctx.transaction::<String>().unwrap_err();
        assert!(matches!(err, DataError::Context(_)));
    }

    #[test]
    fn deadline_keeps_the_earliest() {
        let now = Instant::now();
        let ctx = Context::background().with_deadline(now + Duration::from_secs(1));
        let later = ctx.with_deadline(now + Duration::from_secs(60));
        assert_eq!(later.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn run_completes() {
        let out = Context::background().run(async { 42 }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn run_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = Context::background().with_cancellation(token.clone());
        token.cancel();
        let err = ctx.run(std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, DataError::Cancelled));
        assert!(matches!(ctx.check(), Err(DataError::Cancelled)));
    }

    #[tokio::test]
    async fn run_observes_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(10));
        let err = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::DeadlineExceeded));
    }
}
