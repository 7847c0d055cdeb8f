//! # Persistence collaborator contract.
//!
//! The engine consumes the backing store through this trait only. An
//! implementation is expected to be backed by a database with transactional
//! semantics; the crate ships [`MemoryStore`](crate::MemoryStore) for tests
//! and demos.
//!
//! ## Contract notes
//! - `get_messages_after` must return messages ordered by `sequence`,
//!   strictly greater than the given watermark, filtered to messages not
//!   yet batch-assigned, at most `limit` of them.
//! - `mark_batched` is a bulk filtered update keyed by the exact id set;
//!   order of ids is not significant.
//! - `run_as_group` executes the given unit of work atomically: if the
//!   future resolves to an error, every store write issued inside it must
//!   be rolled back and that error returned. The future's error is the
//!   abort signal; the store adds no classification of its own.
//! - Fallible operations report [`DispatchError::Store`] so the engine's
//!   retry loop can classify them as transient.

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::model::{Batch, Message, Offset, OffsetKind};

/// Persistence operations consumed by the engine.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Reads a named offset record, if it exists.
    async fn get_offset(
        &self,
        kind: OffsetKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Offset>, DispatchError>;

    /// Creates (or replaces) an offset record.
    async fn upsert_offset(&self, offset: &Offset) -> Result<(), DispatchError>;

    /// Updates the `current` value of an existing offset record.
    async fn update_offset(
        &self,
        kind: OffsetKind,
        namespace: &str,
        name: &str,
        current: i64,
    ) -> Result<(), DispatchError>;

    /// Pages unbatched messages ordered by sequence, strictly after the
    /// given watermark.
    async fn get_messages_after(
        &self,
        sequence: i64,
        limit: usize,
    ) -> Result<Vec<Message>, DispatchError>;

    /// Persists a batch record.
    async fn upsert_batch(&self, batch: &Batch) -> Result<(), DispatchError>;

    /// Marks the given messages as assigned to `batch`.
    async fn mark_batched(&self, ids: &[Uuid], batch: Uuid) -> Result<(), DispatchError>;

    /// Executes `work` as one atomic unit; an error from the future rolls
    /// back every write issued inside it and is returned unchanged.
    async fn run_as_group<'a>(
        &'a self,
        work: BoxFuture<'a, Result<(), DispatchError>>,
    ) -> Result<(), DispatchError>;
}
