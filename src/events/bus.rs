//! # Broadcast bus for engine lifecycle events.
//!
//! Thin wrapper around [`tokio::sync::broadcast`]. Publishers are the
//! sequencer, the per-type assemblers, and the offset writer; subscribers
//! are whatever the hosting application attaches via
//! [`BatchManager::subscribe`](crate::BatchManager::subscribe) (and the
//! engine's own tests).
//!
//! Publishing never blocks and never fails: with no subscribers the event
//! is dropped, and a subscriber that lags more than the bus capacity
//! observes `RecvError::Lagged` and skips the oldest items. Events are a
//! best-effort observability surface, not a durable record — the durable
//! record is the store.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for engine events.
///
/// Cheap to clone; every engine task holds one.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus with the given ring-buffer capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active subscribers; returns immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver observing subsequent events only.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn subscribers_observe_published_events() {
        let bus = Bus::new(4);
        let mut rx = bus.subscribe();
        bus.publish(Event::now(EventKind::SequencerStopped));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SequencerStopped);
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = Bus::new(1);
        bus.publish(Event::now(EventKind::ShutdownRequested));
    }
}
