use ambit_data::DataError;

/// Extension trait for converting `sqlx::Error` into `DataError`.
///
/// Due to Rust's orphan rules, we can't implement `From<sqlx::Error> for DataError`
/// in this crate. Instead, use `.into_data_error("what was attempted")`.
pub trait SqlxErrorExt {
    fn into_data_error(self, context: &'static str) -> DataError;
}

impl SqlxErrorExt for sqlx::Error {
    fn into_data_error(self, context: &'static str) -> DataError {
        match self {
            sqlx::Error::PoolTimedOut => DataError::engine(context, "timed out acquiring a connection"),
            other => DataError::engine(context, other),
        }
    }
}
