//! # batchflow
//!
//! Durable batch assembly and dispatch for persisted message logs.
//!
//! The engine reads messages from a store in log-sequence order, groups
//! them into per-type batches bounded by size and time, commits each batch
//! transactionally together with its handler invocation, and tracks a
//! single durable offset so a restart resumes exactly where processing
//! stopped.
//!
//! ```text
//!   message log (store)
//!        │ page after offset
//!        ▼
//!   sequencer ──resolve data──► route by type
//!        │                          │
//!        │                ┌─────────┴─────────┐
//!        │                ▼                   ▼
//!        │          assembler (A)       assembler (B)
//!        │                │ seal               │ seal
//!        │                ▼                   ▼
//!        │      ┌── commit: persist batch + mark members ──┐
//!        │      │          + dispatch handler              │
//!        │      └──────── one unit of work, retried ───────┘
//!        ▼
//!   offset cursor ──► background writer ──► store
//! ```
//!
//! Guarantees:
//! - messages of one type dispatch in log order, each in exactly one
//!   committed batch (at-least-once handler delivery; a rollback re-batches
//!   the same members);
//! - the durable offset never passes a message that still needs work, so
//!   restarts never skip anything;
//! - a slow or failing handler only stalls its own type's pipeline.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchflow::{
//!     Batch, BatchManager, Config, DispatchError, DispatchFn, MemoryStore,
//!     MessageType, Options,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let manager = BatchManager::builder(Config::default())
//!     .with_store(store.clone())
//!     .with_resolver(store)
//!     .build()?;
//!
//! manager
//!     .register_dispatcher(
//!         MessageType::Broadcast,
//!         DispatchFn::arc(|_ctx, batch: Batch| async move {
//!             println!("dispatched {} messages", batch.len());
//!             Ok::<(), DispatchError>(())
//!         }),
//!         Options::default(),
//!     )
//!     .await;
//!
//! manager.start().await?;
//! // ... insert messages, call manager.notify(seq) ...
//! manager.close();
//! manager.wait_stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod memory;
pub mod model;
pub mod policies;
pub mod resolver;
pub mod store;

pub use crate::core::{BatchManager, BatchManagerBuilder};
pub use config::Config;
pub use dispatch::{Dispatch, DispatchFn, DispatchRef, Options};
pub use error::{DispatchError, EngineError};
pub use events::{Bus, Event, EventKind};
pub use memory::MemoryStore;
pub use model::{
    Batch, BatchPayload, Data, DataRef, Message, MessageType, Offset, OffsetKind,
    BATCH_OFFSET_NAME, SYSTEM_NAMESPACE,
};
pub use policies::{Backoff, Retry};
pub use resolver::DataResolver;
pub use store::Store;
