//! The durable resumption cursor record.

use serde::{Deserialize, Serialize};

/// Namespace owning system-scoped records such as the batch offset.
pub const SYSTEM_NAMESPACE: &str = "system";

/// Name of the single batch-dispatch offset record.
pub const BATCH_OFFSET_NAME: &str = "message-batching";

/// Classification of offset records.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetKind {
    /// High-water mark of the batch-dispatch engine.
    Batch,
}

/// A named durable cursor scoped by (kind, namespace, name).
///
/// Exactly one `(Batch, "system", "message-batching")` record exists per
/// deployment; its `current` value only ever grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// Record classification.
    pub kind: OffsetKind,
    /// Scope namespace.
    pub namespace: String,
    /// Scope name.
    pub name: String,
    /// The monotonically non-decreasing cursor value.
    pub current: i64,
}

impl Offset {
    /// The initial batch-dispatch offset record, starting at sequence zero.
    pub fn batch_initial() -> Self {
        Self {
            kind: OffsetKind::Batch,
            namespace: SYSTEM_NAMESPACE.to_string(),
            name: BATCH_OFFSET_NAME.to_string(),
            current: 0,
        }
    }
}
