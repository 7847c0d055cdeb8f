//! # Per-type batch assembly worker.
//!
//! One [`Assembler`] runs per registered message type, fed routed work over
//! a bounded channel. Its loop has three phases:
//!
//! ```text
//!   ┌─ idle ───────────────┐   first    ┌─ accumulate ─────────────┐
//!   │ recv / dispose timer │ ─────────► │ until max size, timeout, │
//!   └──────────▲───────────┘            │ or channel close         │
//!              │                        └────────────┬─────────────┘
//!              │                              seal   ▼
//!              │                        ┌─ commit ─────────────────┐
//!              └────────────────────────│ persist + mark + handler │
//!                                       │ as one unit, with retry  │
//!                                       └──────────────────────────┘
//! ```
//!
//! The batch timeout starts when the first message opens a batch, never
//! while idle. A zero timeout seals on the first poll of the timer, so a
//! lone message still dispatches promptly while a burst that is already
//! buffered can fill the batch first.
//!
//! Commit is transactional: persist the batch, mark the members assigned,
//! and run the handler inside one unit of work. A handler rejection rolls
//! everything back and the member sequences are requeued for automatic
//! re-pickup; transient store failures retry the whole unit with backoff.
//!
//! An idle worker with a dispose timeout tears itself down. Teardown
//! closes the intake first and drains anything that raced in, requeueing
//! it, so no routed work is lost between "timer fired" and "worker gone".

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dispatch::{DispatchRef, Options};
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{Batch, Data, Message, MessageType};
use crate::policies::Retry;
use crate::store::Store;

use super::offset::OffsetCursor;

/// One routed message with its resolved data, ready for assembly.
#[derive(Debug)]
pub struct BatchWork {
    /// The member message.
    pub message: Message,
    /// Its resolved data records.
    pub data: Vec<Data>,
}

/// Worker state for one message type's pipeline.
pub struct Assembler {
    pub mtype: MessageType,
    pub handler: DispatchRef,
    pub options: Options,
    pub store: Arc<dyn Store>,
    pub cursor: Arc<OffsetCursor>,
    pub bus: Bus,
    pub retry: Retry,
}

impl Assembler {
    /// Runs the assembly loop until cancellation, intake close, or idle
    /// teardown.
    pub async fn run(self, mut rx: mpsc::Receiver<BatchWork>, token: CancellationToken) {
        loop {
            // Idle: wait for the message that opens the next batch.
            let first = if let Some(idle) = self.options.dispose() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    work = rx.recv() => match work {
                        Some(work) => work,
                        None => return,
                    },
                    _ = time::sleep(idle) => {
                        self.dispose(rx).await;
                        return;
                    }
                }
            } else {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    work = rx.recv() => match work {
                        Some(work) => work,
                        None => return,
                    },
                }
            };

            // Accumulate: the timeout window opens with the first member.
            let deadline = Instant::now() + self.options.batch_timeout;
            let max = self.options.max_size_clamped();
            let mut works = vec![first];
            let mut intake_closed = false;

            while works.len() < max {
                tokio::select! {
                    biased;
                    // A partial batch at shutdown is abandoned, not
                    // committed: its members were never marked and are
                    // re-read after restart.
                    _ = token.cancelled() => return,
                    work = rx.recv() => match work {
                        Some(work) => works.push(work),
                        None => {
                            intake_closed = true;
                            break;
                        }
                    },
                    _ = time::sleep_until(deadline) => break,
                }
            }

            self.seal_and_commit(works, &token).await;

            if intake_closed {
                return;
            }
        }
    }

    async fn seal_and_commit(&self, works: Vec<BatchWork>, token: &CancellationToken) {
        let opener = &works[0].message;
        let mut batch = Batch::new(opener.namespace.clone(), opener.author.clone());
        for work in works {
            batch.push(work.message, work.data);
        }
        let seqs = batch.sequences();

        self.bus.publish(
            Event::now(EventKind::BatchSealed)
                .with_batch(batch.id)
                .with_mtype(self.mtype)
                .with_count(batch.len()),
        );
        debug!(
            batch = %batch.id,
            mtype = %self.mtype,
            count = batch.len(),
            "batch sealed"
        );

        match self.commit(&batch, token).await {
            Ok(()) => {
                self.cursor.complete(&seqs).await;
                self.bus.publish(
                    Event::now(EventKind::BatchDispatched)
                        .with_batch(batch.id)
                        .with_mtype(self.mtype)
                        .with_count(batch.len()),
                );
            }
            Err(e) => {
                warn!(batch = %batch.id, error = %e, "dispatch rolled back");
                self.cursor.requeue(&seqs).await;
                self.bus.publish(
                    Event::now(EventKind::DispatchRolledBack)
                        .with_batch(batch.id)
                        .with_mtype(self.mtype)
                        .with_count(batch.len())
                        .with_reason(e.as_label()),
                );
            }
        }
    }

    /// Persists the batch, marks its members assigned, and dispatches it,
    /// all inside one unit of work. Transient store failures retry the
    /// whole unit; a handler rejection aborts it.
    async fn commit(&self, batch: &Batch, token: &CancellationToken) -> Result<(), DispatchError> {
        let ids = batch.message_ids();
        self.retry
            .run(token, |_| {
                let ids = &ids;
                let ctx = token.clone();
                async move {
                    self.store
                        .run_as_group(Box::pin(async move {
                            self.store.upsert_batch(batch).await?;
                            self.store.mark_batched(ids, batch.id).await?;
                            self.handler.dispatch(ctx, batch).await
                        }))
                        .await
                }
            })
            .await
    }

    /// Idle teardown: close the intake, requeue anything that raced in,
    /// and announce the disposal so the registry respawns on demand.
    async fn dispose(&self, mut rx: mpsc::Receiver<BatchWork>) {
        rx.close();
        let mut orphaned = Vec::new();
        while let Ok(work) = rx.try_recv() {
            orphaned.push(work.message.sequence);
        }
        if !orphaned.is_empty() {
            self.cursor.requeue(&orphaned).await;
        }
        self.bus
            .publish(Event::now(EventKind::AssemblerDisposed).with_mtype(self.mtype));
        debug!(mtype = %self.mtype, orphaned = orphaned.len(), "assembler disposed");
    }
}
