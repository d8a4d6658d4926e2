/// Boxed error used as the cause of wrapped driver failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Message prefix carried by every transaction lifecycle failure.
pub const MSG_TRANSACTION_ERROR: &str = "error processing transaction";

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The caller passed input that can never succeed (zero-value entity,
    /// empty batch, invalid field name). Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Begin or commit failed at the transaction manager boundary.
    #[error("{msg}: {source}", msg = MSG_TRANSACTION_ERROR)]
    Transaction {
        #[source]
        source: BoxError,
    },

    /// The transaction handle was already committed or rolled back.
    #[error("transaction has already been committed or rolled back")]
    TransactionFinished,

    /// Any other failure reported by the database engine.
    #[error("{context}: {source}")]
    Engine {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// A preload named a relation the entity does not define.
    #[error("unsupported relation `{relation}` for entity `{entity}`")]
    UnknownRelation {
        entity: &'static str,
        relation: String,
    },

    /// The execution context could not be inspected.
    #[error("execution context error: {0}")]
    Context(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl DataError {
    /// Shorthand for [`DataError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        DataError::Validation(msg.into())
    }

    /// Wrap a begin/commit failure.
    pub fn transaction(err: impl Into<BoxError>) -> Self {
        DataError::Transaction { source: err.into() }
    }

    /// Wrap an engine failure with a short description of what was attempted.
    ///
    /// Used by backend crates (e.g. `ambit-data-sqlx`) to wrap driver errors.
    pub fn engine(context: &'static str, err: impl Into<BoxError>) -> Self {
        DataError::Engine {
            context,
            source: err.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DataError::Validation(_))
    }

    /// True for begin/commit failures and for use of a finished handle.
    pub fn is_transaction(&self) -> bool {
        matches!(
            self,
            DataError::Transaction { .. } | DataError::TransactionFinished
        )
    }
}
