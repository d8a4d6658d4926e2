use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::{Timestamp, Value};

/// Common columns for entities keyed by a UUID with soft-delete support.
///
/// Embed with `#[sqlx(flatten)]` and forward the entity hooks to
/// [`touch_insert`](BaseEntity::touch_insert) and
/// [`touch_update`](BaseEntity::touch_update).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BaseEntity {
    /// UUID in text form; empty until the first insert.
    pub id: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl BaseEntity {
    pub fn is_zero(&self) -> bool {
        self.id.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn id_value(&self) -> Value {
        if self.id.is_empty() {
            Value::Null
        } else {
            Value::from(&self.id)
        }
    }

    /// Assign an id (time-ordered UUID) if missing and stamp both timestamps.
    pub fn touch_insert(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::now_v7().to_string();
        }
        let now = Timestamp::now();
        if self.created_at == Timestamp::default() {
            self.created_at = now;
        }
        self.updated_at = now;
    }

    pub fn touch_update(&mut self) {
        self.updated_at = Timestamp::now();
    }

    /// The timestamp columns, for [`Entity::values`](crate::Entity::values).
    pub fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("created_at", self.created_at.into()),
            ("updated_at", self.updated_at.into()),
            ("deleted_at", self.deleted_at.into()),
        ]
    }
}
