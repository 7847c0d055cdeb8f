//! # Durable offset cursor with an advancement gate.
//!
//! The engine reads messages strictly after the offset watermark, so the
//! watermark may only pass a sequence once that sequence needs no further
//! work. Commits happen asynchronously per type, out of log order, and a
//! deferred message must keep the cursor pinned below it or it would be
//! silently skipped on restart. [`OffsetCursor`] tracks both concerns with
//! a single ordered gate:
//!
//! ```text
//!              gate (in-memory, ordered by sequence)
//!   current ──►│ 5:Routed │ 6:Deferred │ 9:Routed │
//!              └──────────┴────────────┴──────────┘
//!   complete([5])  → current = 5           (6 still gates)
//!   complete([9])  → current stays 5       (6 still gates)
//!   complete([6])  → current = 9           (gate empty)
//! ```
//!
//! - `track(seq)` marks a sequence as routed into an open batch. Routed
//!   sequences are skipped on re-reads (no duplicate routing) and gate the
//!   watermark until their batch commits.
//! - `defer(seq)` marks a sequence as waiting for data. Deferred sequences
//!   are re-examined on every pass and gate the watermark.
//! - `requeue(seqs)` demotes routed sequences back to deferred after a
//!   rollback, making them eligible for re-pickup.
//! - `complete(seqs)` marks committed sequences done and advances the
//!   watermark to `min(max(seqs), lowest remaining gate − 1)`. Done
//!   sequences the watermark cannot pass yet stay in the gate as
//!   tombstones: page reads can be stale relative to commits, and a
//!   tombstone keeps such a message from being routed into a second
//!   batch before the watermark covers it.
//!
//! Advancement is decoupled from persistence: `complete` updates the
//! in-memory watermark and signals a watch channel; a dedicated writer task
//! persists the newest value with indefinite retry, so a store outage
//! stalls durability without blocking assemblers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{Offset, OffsetKind, BATCH_OFFSET_NAME, SYSTEM_NAMESPACE};
use crate::policies::Retry;
use crate::store::Store;

/// Why an in-flight sequence is gating the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Waiting for data; re-examined on every sequencer pass.
    Deferred,
    /// Routed into an open batch; skipped on re-reads until committed.
    Routed,
    /// Committed, but the watermark has not passed it yet because a lower
    /// sequence still gates. Kept as a tombstone so a page read taken
    /// before the commit became visible cannot route it a second time.
    Done,
}

#[derive(Debug)]
struct Gate {
    current: i64,
    inflight: BTreeMap<i64, Slot>,
}

/// Tracks the durable resumption point and the in-flight sequences that
/// must not be passed yet.
pub struct OffsetCursor {
    store: Arc<dyn Store>,
    retry: Retry,
    bus: Bus,
    state: Mutex<Gate>,
    watermark: watch::Sender<i64>,
}

impl OffsetCursor {
    pub fn new(store: Arc<dyn Store>, retry: Retry, bus: Bus) -> Self {
        let (watermark, _) = watch::channel(0);
        Self {
            store,
            retry,
            bus,
            state: Mutex::new(Gate {
                current: 0,
                inflight: BTreeMap::new(),
            }),
            watermark,
        }
    }

    /// Loads the durable offset record, creating the initial one on first
    /// run. Failures are not retried: without a trustworthy resumption
    /// point the engine must not start.
    pub async fn restore(&self) -> Result<i64, DispatchError> {
        let existing = self
            .store
            .get_offset(OffsetKind::Batch, SYSTEM_NAMESPACE, BATCH_OFFSET_NAME)
            .await?;

        let current = match existing {
            Some(offset) => offset.current,
            None => {
                let initial = Offset::batch_initial();
                self.store.upsert_offset(&initial).await?;
                initial.current
            }
        };

        let mut state = self.state.lock().await;
        state.current = current;
        let _ = self.watermark.send_replace(current);
        info!(offset = current, "offset restored");
        Ok(current)
    }

    /// The in-memory watermark. Reads resume strictly after this value.
    pub async fn current(&self) -> i64 {
        self.state.lock().await.current
    }

    /// True when the sequence needs no routing: it is already in an open
    /// batch, already committed, or behind the watermark. Page reads can
    /// be stale relative to commits, so the sequencer must consult this
    /// before routing every message.
    pub async fn is_claimed(&self, seq: i64) -> bool {
        let state = self.state.lock().await;
        seq <= state.current
            || matches!(
                state.inflight.get(&seq),
                Some(Slot::Routed) | Some(Slot::Done)
            )
    }

    /// Marks a sequence as routed. Must happen before the hand-off to the
    /// assembler, or a fast commit could try to complete an untracked
    /// sequence.
    pub async fn track(&self, seq: i64) {
        self.state.lock().await.inflight.insert(seq, Slot::Routed);
    }

    /// Marks a sequence as deferred (waiting for data).
    pub async fn defer(&self, seq: i64) {
        self.state.lock().await.inflight.insert(seq, Slot::Deferred);
    }

    /// Demotes sequences back to deferred after a rollback so the next
    /// pass re-routes them.
    pub async fn requeue(&self, seqs: &[i64]) {
        let mut state = self.state.lock().await;
        for &seq in seqs {
            state.inflight.insert(seq, Slot::Deferred);
        }
    }

    /// Marks committed sequences done and advances the watermark as far
    /// as the remaining gate allows. Sequences the watermark cannot pass
    /// yet stay in the gate as tombstones (claimed, non-gating) until it
    /// does.
    pub async fn complete(&self, seqs: &[i64]) {
        let Some(&candidate) = seqs.iter().max() else {
            return;
        };

        let mut state = self.state.lock().await;
        for &seq in seqs {
            state.inflight.insert(seq, Slot::Done);
        }

        // The watermark may pass the leading run of done sequences
        // (including earlier tombstones), but never the first sequence
        // that still needs work.
        let mut floor = i64::MAX;
        let mut reach = candidate;
        for (&seq, slot) in state.inflight.iter() {
            if *slot != Slot::Done {
                floor = seq - 1;
                break;
            }
            reach = reach.max(seq);
        }
        let target = reach.min(floor);

        if target > state.current {
            state.current = target;
            debug!(offset = target, "watermark advanced");
            let _ = self.watermark.send_replace(target);
        }
        let current = state.current;
        state
            .inflight
            .retain(|&seq, slot| *slot != Slot::Done || seq > current);
    }

    /// Spawns the background writer that persists watermark advances.
    ///
    /// Each persisted value is the newest at the time of the write; a burst
    /// of advances collapses into one update. Persistence failures retry
    /// with backoff until the token is cancelled.
    pub fn spawn_writer(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.watermark.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let target = *rx.borrow_and_update();
                let persisted = self
                    .retry
                    .run(&token, |_| {
                        let store = self.store.clone();
                        async move {
                            store
                                .update_offset(
                                    OffsetKind::Batch,
                                    SYSTEM_NAMESPACE,
                                    BATCH_OFFSET_NAME,
                                    target,
                                )
                                .await
                        }
                    })
                    .await;

                match persisted {
                    Ok(()) => {
                        self.bus
                            .publish(Event::now(EventKind::OffsetAdvanced).with_offset(target));
                    }
                    Err(e) => {
                        warn!(offset = target, error = %e, "offset persist abandoned");
                        break;
                    }
                }
            }
        })
    }
}
