//! Data records resolved lazily for batch payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An opaque payload record referenced by messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    /// Unique identity; the target of [`DataRef::id`](crate::model::DataRef).
    pub id: Uuid,
    /// Content hash.
    pub hash: String,
    /// Opaque payload. The engine never interprets it.
    pub value: Value,
}

impl Data {
    /// Creates a data record with the given payload.
    pub fn new(id: Uuid, hash: impl Into<String>, value: Value) -> Self {
        Self {
            id,
            hash: hash.into(),
            value,
        }
    }
}
