//! Error types used by the batch engine.
//!
//! Two enums split the failure surface the same way the runtime splits its
//! lifecycle:
//!
//! - [`EngineError`] — construction and start-time failures. These are
//!   returned synchronously to the caller and the engine never runs.
//! - [`DispatchError`] — steady-state failures raised while sequencing,
//!   assembling, or committing batches. These are contained to the affected
//!   pass or batch and never terminate the engine on their own.
//!
//! Both types provide `as_label()` returning a short stable snake_case code
//! for logs and assertions, and [`DispatchError::is_retryable`] classifies
//! which failures the retry loop may keep attempting.

use thiserror::Error;
use uuid::Uuid;

use crate::model::MessageType;

/// Errors raised while constructing or starting the engine.
///
/// All of these are fatal to the operation that produced them: a manager
/// that fails to build or start holds no background tasks.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// No persistence collaborator was supplied to the builder.
    #[error("no message store supplied")]
    MissingStore,

    /// No data-resolution collaborator was supplied to the builder.
    #[error("no data resolver supplied")]
    MissingResolver,

    /// `start()` was called on a manager that is already running.
    #[error("engine already started")]
    AlreadyStarted,

    /// The durable offset could not be restored at start.
    ///
    /// Restore failures are not retried: if the engine cannot even determine
    /// whether an offset record exists, starting would risk reprocessing from
    /// an arbitrary point.
    #[error("offset restore failed: {source}")]
    OffsetRestore {
        /// The underlying store failure.
        source: DispatchError,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::MissingStore => "missing_store",
            EngineError::MissingResolver => "missing_resolver",
            EngineError::AlreadyStarted => "already_started",
            EngineError::OffsetRestore { .. } => "offset_restore_failed",
        }
    }
}

/// Errors raised while routing messages and committing batches.
///
/// Only [`DispatchError::Store`] is retryable; everything else either
/// defers the message to a later pass or rolls the unit of work back.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No dispatcher is registered for the message's type.
    ///
    /// The sequencer reports this distinctly and drops the message from
    /// active processing so that an unroutable message cannot wedge the
    /// cursor forever.
    #[error("no dispatcher registered for message type '{mtype}'")]
    Unroutable {
        /// The type that had no registration.
        mtype: MessageType,
    },

    /// The message references data that the resolver reports as
    /// definitively unavailable (as opposed to "not arrived yet").
    #[error("message {message} references data that cannot be resolved")]
    MissingData {
        /// The affected message.
        message: Uuid,
    },

    /// The type's assembler intake is full. Not a fault: the message
    /// stays deferred and is re-read on a later pass, so backpressure
    /// from one slow type never blocks the routing of others.
    #[error("assembler intake full for message type '{mtype}'")]
    Saturated {
        /// The type whose intake is at capacity.
        mtype: MessageType,
    },

    /// A persistence operation failed. Retryable while the governing
    /// token is live.
    #[error("store operation failed: {error}")]
    Store {
        /// The underlying error message.
        error: String,
    },

    /// The registered handler rejected a batch. Aborts the unit of work
    /// for that batch only; the member messages return to the unassigned
    /// pool for automatic re-pickup.
    #[error("handler rejected batch: {error}")]
    Handler {
        /// The underlying error message.
        error: String,
    },

    /// The operation was abandoned because the governing token was
    /// cancelled.
    #[error("operation cancelled")]
    Canceled,
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use batchflow::{DispatchError, MessageType};
    ///
    /// let err = DispatchError::Unroutable { mtype: MessageType::Private };
    /// assert_eq!(err.as_label(), "unroutable_message");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Unroutable { .. } => "unroutable_message",
            DispatchError::MissingData { .. } => "missing_data",
            DispatchError::Saturated { .. } => "intake_saturated",
            DispatchError::Store { .. } => "store_failure",
            DispatchError::Handler { .. } => "handler_rejected",
            DispatchError::Canceled => "canceled",
        }
    }

    /// Indicates whether the retry loop may keep attempting the operation.
    ///
    /// Only transient persistence failures qualify. A handler rejection is
    /// handled by rolling back the unit of work, and the remaining variants
    /// are decisions, not faults.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Store { .. })
    }

    /// Wraps an arbitrary store-side failure.
    pub fn store(error: impl std::fmt::Display) -> Self {
        DispatchError::Store {
            error: error.to_string(),
        }
    }
}
