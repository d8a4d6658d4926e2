use ambit_data::{DataError, Value};
use sqlx::any::AnyArguments;
use sqlx::Arguments;

/// Bind `params` in order. `Value::Null` is bound as a null `BIGINT`, the
/// type of the soft-delete marker column (see [`Value::Null`] for what that
/// means on PostgreSQL).
pub(crate) fn arguments<'q>(params: Vec<Value>) -> Result<AnyArguments<'q>, DataError> {
    let mut args = AnyArguments::default();
    for param in params {
        let bound = match param {
            Value::Null => args.add(None::<i64>),
            Value::Bool(v) => args.add(v),
            Value::Int(v) => args.add(v),
            Value::Float(v) => args.add(v),
            Value::Text(v) => args.add(v),
            Value::Bytes(v) => args.add(v),
            Value::Timestamp(v) => args.add(v),
        };
        bound.map_err(|e| DataError::engine("error binding parameters", e))?;
    }
    Ok(args)
}
