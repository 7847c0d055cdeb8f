//! Data-resolution collaborator contract.

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::model::{Data, Message};

/// Resolves a message's data references into payload records.
///
/// The boolean distinguishes "come back later" from a definitive answer:
/// `(_, false)` means not all referenced data has arrived yet — the engine
/// defers the message without error. `(data, true)` is a complete answer;
/// if it covers fewer records than the message references, the engine
/// reports the distinct `missing_data` condition. An `Err` is reserved for
/// non-recoverable lookup failures (it aborts the sequencer pass, which
/// retries on the next wake).
#[async_trait]
pub trait DataResolver: Send + Sync + 'static {
    /// Returns the resolved data for `message` and whether the set is
    /// complete.
    async fn resolve(&self, message: &Message) -> Result<(Vec<Data>, bool), DispatchError>;
}
