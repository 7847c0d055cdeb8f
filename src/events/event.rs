//! # Lifecycle events emitted by the engine.
//!
//! [`EventKind`] classifies what happened; [`Event`] carries the metadata.
//! Every event gets a globally unique, monotonically increasing sequence
//! number (`seq`) so subscribers can restore exact order even when events
//! from different tasks interleave.
//!
//! Events are the engine's observability surface: tests assert on them, and
//! hosting applications can subscribe for metrics or logging without the
//! engine taking a logging dependency on their behalf.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use uuid::Uuid;

use crate::model::MessageType;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Offset cursor ===
    /// The durable offset was restored (or created) at start.
    ///
    /// Sets: `offset`.
    OffsetRestored,

    /// The durable offset advanced to a new watermark.
    ///
    /// Sets: `offset`.
    OffsetAdvanced,

    // === Sequencer ===
    /// A message was skipped for this pass because not all of its
    /// referenced data has arrived yet. Not an error; the message stays
    /// eligible and the cursor does not advance past it.
    ///
    /// Sets: `message`, `mtype`.
    MessageDeferred,

    /// A message references data the resolver reports as definitively
    /// unresolvable (`missing_data`).
    ///
    /// Sets: `message`, `reason`.
    MessageMissingData,

    /// A message's type has no registered dispatcher (`unroutable_message`).
    /// The message is dropped from active processing and the cursor
    /// advances past it once it reaches the front.
    ///
    /// Sets: `message`, `mtype`.
    MessageUnroutable,

    /// The sequencer loop exited permanently.
    SequencerStopped,

    // === Assemblers ===
    /// A per-type assembler worker was created (lazily, on first route).
    ///
    /// Sets: `mtype`.
    AssemblerSpawned,

    /// An idle assembler worker tore itself down after its dispose
    /// timeout. A later message for the type respawns it transparently.
    ///
    /// Sets: `mtype`.
    AssemblerDisposed,

    /// A batch reached its size or time bound and is entering commit.
    ///
    /// Sets: `batch`, `mtype`, `count`.
    BatchSealed,

    /// A batch was durably committed and its handler returned success.
    ///
    /// Sets: `batch`, `mtype`, `count`.
    BatchDispatched,

    /// The handler rejected a batch; the whole unit of work was rolled
    /// back and the member messages returned to the unassigned pool.
    ///
    /// Sets: `batch`, `mtype`, `count`, `reason`.
    DispatchRolledBack,

    // === Shutdown ===
    /// Graceful stop was requested via `close()`.
    ShutdownRequested,
}

/// Engine event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Message type, when the event concerns one type's pipeline.
    pub mtype: Option<MessageType>,
    /// Message identity, for per-message events.
    pub message: Option<Uuid>,
    /// Batch identity, for batch lifecycle events.
    pub batch: Option<Uuid>,
    /// Offset value, for cursor events.
    pub offset: Option<i64>,
    /// Member count, for batch events.
    pub count: Option<usize>,
    /// Human-readable reason (error codes, rollback causes).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event of the given kind with the next global sequence.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            mtype: None,
            message: None,
            batch: None,
            offset: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a message type.
    #[inline]
    pub fn with_mtype(mut self, mtype: MessageType) -> Self {
        self.mtype = Some(mtype);
        self
    }

    /// Attaches a message identity.
    #[inline]
    pub fn with_message(mut self, id: Uuid) -> Self {
        self.message = Some(id);
        self
    }

    /// Attaches a batch identity.
    #[inline]
    pub fn with_batch(mut self, id: Uuid) -> Self {
        self.batch = Some(id);
        self
    }

    /// Attaches an offset value.
    #[inline]
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attaches a member count.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
