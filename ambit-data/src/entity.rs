use crate::specification::Filter;
use crate::value::Value;

/// A record type persisted in one table.
///
/// The `Default` value is the entity's *zero value*: mutating repository
/// operations reject it, and `find_first` returns it when nothing matches.
///
/// # Example
///
/// ```
/// use ambit_data::{Entity, Value};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Tag {
///     id: i64,
///     label: String,
/// }
///
/// impl Entity for Tag {
///     type Filter = ();
///     fn table_name() -> &'static str { "tags" }
///     fn id(&self) -> Value { if self.id == 0 { Value::Null } else { self.id.into() } }
///     fn values(&self) -> Vec<(&'static str, Value)> { vec![("label", (&self.label).into())] }
///     fn deleted_at_column() -> Option<&'static str> { None }
///     fn created_at_column() -> &'static str { "id" }
/// }
///
/// assert!(Tag::default().is_zero());
/// assert_eq!(Tag::table_name(), "tags");
/// ```
pub trait Entity: Default + PartialEq + Send + Sync + Unpin + 'static {
    /// Typed filter used by [`Specification`](crate::Specification).
    type Filter: Filter;

    fn table_name() -> &'static str;

    fn id_column() -> &'static str {
        "id"
    }

    /// The primary key, or [`Value::Null`] when the engine has not assigned
    /// one yet.
    fn id(&self) -> Value;

    /// Every persisted column except the id, in a stable order.
    fn values(&self) -> Vec<(&'static str, Value)>;

    /// Column used for the default newest-first ordering.
    fn created_at_column() -> &'static str {
        "created_at"
    }

    /// Soft-delete marker column. `None` for entities without one.
    fn deleted_at_column() -> Option<&'static str> {
        Some("deleted_at")
    }

    /// Called before the record is inserted.
    fn before_insert(&mut self) {}

    /// Called before the record is saved over an existing row.
    fn before_update(&mut self) {}

    fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// `id` plus [`values`](Entity::values), for statements that write the
    /// key explicitly.
    fn values_with_id(&self) -> Vec<(&'static str, Value)> {
        let mut values = self.values();
        let id = self.id();
        if !id.is_null() {
            values.insert(0, (Self::id_column(), id));
        }
        values
    }
}
