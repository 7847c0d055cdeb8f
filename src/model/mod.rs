//! Domain model: messages, data, batches, and the durable offset.
//!
//! All types here are plain serde-friendly records. The engine treats them
//! as immutable once created, with one exception enforced by the commit
//! step: a message's `batch` assignment.

mod batch;
mod data;
mod message;
mod offset;

pub use batch::{Batch, BatchPayload};
pub use data::Data;
pub use message::{DataRef, Message, MessageType};
pub use offset::{Offset, OffsetKind, BATCH_OFFSET_NAME, SYSTEM_NAMESPACE};
