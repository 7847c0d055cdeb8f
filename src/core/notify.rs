//! # New-message notification intake.
//!
//! Producers that just inserted a message can hint the engine instead of
//! waiting out the poll timeout. Hints flow through two lossy stages:
//!
//! ```text
//!   producers ──try_send──► hints (cap N) ──drain──► tap (cap 1) ──► sequencer
//! ```
//!
//! Both stages drop on overflow. A hint carries no payload the sequencer
//! trusts — it re-reads from the durable watermark regardless — so any
//! number of hints collapse into "wake up at least once", and a dropped
//! hint is covered by the unconditional poll timeout.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Front door for new-message hints.
#[derive(Clone)]
pub struct Notifier {
    hints: mpsc::Sender<i64>,
}

impl Notifier {
    /// Creates the notifier and the receiving end of the hint channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<i64>) {
        let (hints, rx) = mpsc::channel(capacity.max(1));
        (Self { hints }, rx)
    }

    /// A cloneable sender for producers that outlive the notifier handle.
    pub fn sender(&self) -> mpsc::Sender<i64> {
        self.hints.clone()
    }

    /// Hints that a message with the given sequence was inserted.
    /// Never blocks; dropped on overflow.
    pub fn hint(&self, seq: i64) {
        if self.hints.try_send(seq).is_err() {
            debug!(seq, "hint dropped, intake full");
        }
    }

    /// Spawns the drain task that collapses hints onto the single-slot
    /// shoulder tap.
    pub fn spawn_drain(
        mut rx: mpsc::Receiver<i64>,
        tap: mpsc::Sender<()>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    hint = rx.recv() => {
                        match hint {
                            Some(_) => {
                                // A pending tap already guarantees a wake.
                                let _ = tap.try_send(());
                            }
                            None => break,
                        }
                    }
                }
            }
        })
    }
}
