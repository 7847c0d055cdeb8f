//! # Batch handler contract and closure-backed implementation.
//!
//! A [`Dispatch`] receives each committed batch of its registered type
//! exactly once per commit attempt, inside the transactional unit of work:
//! returning an error rolls the whole unit back and the member messages are
//! re-batched on a later pass (at-least-once semantics). [`DispatchFn`]
//! wraps a closure for the common case; [`DispatchRef`] is the shared
//! handle the engine stores per registration.
//!
//! The handler receives the engine's live [`CancellationToken`] so a
//! long-running dispatch can observe shutdown. A handler that blocks
//! indefinitely blocks only its own type's assembler.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;
use crate::model::Batch;

/// Shared handle to a registered handler.
pub type DispatchRef = Arc<dyn Dispatch>;

/// Receives committed batches for one message type.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use batchflow::{Batch, Dispatch, DispatchError};
///
/// struct Printer;
///
/// #[async_trait]
/// impl Dispatch for Printer {
///     async fn dispatch(
///         &self,
///         _ctx: CancellationToken,
///         batch: &Batch,
///     ) -> Result<(), DispatchError> {
///         println!("batch {} with {} messages", batch.id, batch.len());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Handles one committed batch.
    ///
    /// Runs inside the unit of work that persisted the batch; an error
    /// rolls that unit back.
    async fn dispatch(&self, ctx: CancellationToken, batch: &Batch) -> Result<(), DispatchError>;
}

/// Closure-backed handler.
///
/// The closure receives an owned clone of the batch, producing a fresh
/// future per dispatch with no shared mutable state.
pub struct DispatchFn<F> {
    f: F,
}

impl<F> DispatchFn<F> {
    /// Wraps a closure as a handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps a closure and returns it as a shared [`DispatchRef`].
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Dispatch for DispatchFn<F>
where
    F: Fn(CancellationToken, Batch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    async fn dispatch(&self, ctx: CancellationToken, batch: &Batch) -> Result<(), DispatchError> {
        (self.f)(ctx, batch.clone()).await
    }
}
