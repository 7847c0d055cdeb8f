//! # Dispatcher registry and per-type worker lifecycle.
//!
//! Maps each message type to its handler, its batching options, and its
//! (lazily created) assembler worker. Routing a message for a type with no
//! live worker spawns one; a worker that disposed itself while idle is
//! respawned transparently on the next message. A type with no
//! registration at all is unroutable — that is the sequencer's signal to
//! drop the message rather than wedge the cursor.
//!
//! The intake channel is bounded at the type's max batch size and `route`
//! never waits on it: a full intake reports saturation so the sequencer
//! can defer the message and keep routing other types. Backpressure from
//! one slow handler is therefore confined entirely to its own type.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dispatch::{DispatchRef, Options};
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::model::MessageType;
use crate::policies::Retry;
use crate::store::Store;

use super::assembler::{Assembler, BatchWork};
use super::offset::OffsetCursor;

struct Worker {
    tx: mpsc::Sender<BatchWork>,
    join: JoinHandle<()>,
}

struct Dispatcher {
    handler: DispatchRef,
    options: Options,
    worker: Option<Worker>,
}

/// Per-type dispatcher registrations and their workers.
pub struct Registry {
    store: Arc<dyn Store>,
    cursor: Arc<OffsetCursor>,
    bus: Bus,
    retry: Retry,
    token: CancellationToken,
    dispatchers: Mutex<HashMap<MessageType, Dispatcher>>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn Store>,
        cursor: Arc<OffsetCursor>,
        bus: Bus,
        retry: Retry,
        token: CancellationToken,
    ) -> Self {
        Self {
            store,
            cursor,
            bus,
            retry,
            token,
            dispatchers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) the handler for a message type.
    ///
    /// No worker is spawned yet; that happens on the first routed message.
    /// Replacing a registration drops the old worker's intake, letting it
    /// finish its open batch and exit.
    pub async fn register(&self, mtype: MessageType, handler: DispatchRef, options: Options) {
        let mut dispatchers = self.dispatchers.lock().await;
        dispatchers.insert(
            mtype,
            Dispatcher {
                handler,
                options,
                worker: None,
            },
        );
        debug!(mtype = %mtype, "dispatcher registered");
    }

    /// Hands routed work to the type's assembler, spawning or respawning
    /// the worker as needed. Never waits on intake capacity or on the
    /// handler: a full intake is reported as [`DispatchError::Saturated`]
    /// and the caller defers the message.
    pub async fn route(&self, work: BatchWork) -> Result<(), DispatchError> {
        let mtype = work.message.mtype;
        let tx = self.worker_sender(mtype).await?;

        match tx.try_send(work) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(DispatchError::Saturated { mtype }),
            Err(mpsc::error::TrySendError::Closed(work)) => {
                // The worker disposed itself between lookup and send.
                let tx = self.respawn(mtype).await?;
                tx.try_send(work).map_err(|e| match e {
                    mpsc::error::TrySendError::Full(_) => DispatchError::Saturated { mtype },
                    mpsc::error::TrySendError::Closed(_) => DispatchError::Canceled,
                })
            }
        }
    }

    async fn worker_sender(
        &self,
        mtype: MessageType,
    ) -> Result<mpsc::Sender<BatchWork>, DispatchError> {
        let mut dispatchers = self.dispatchers.lock().await;
        let dispatcher = dispatchers
            .get_mut(&mtype)
            .ok_or(DispatchError::Unroutable { mtype })?;

        match &dispatcher.worker {
            Some(worker) if !worker.tx.is_closed() => Ok(worker.tx.clone()),
            _ => {
                let worker = self.spawn_worker(mtype, dispatcher);
                let tx = worker.tx.clone();
                dispatcher.worker = Some(worker);
                Ok(tx)
            }
        }
    }

    async fn respawn(&self, mtype: MessageType) -> Result<mpsc::Sender<BatchWork>, DispatchError> {
        let mut dispatchers = self.dispatchers.lock().await;
        let dispatcher = dispatchers
            .get_mut(&mtype)
            .ok_or(DispatchError::Unroutable { mtype })?;
        let worker = self.spawn_worker(mtype, dispatcher);
        let tx = worker.tx.clone();
        dispatcher.worker = Some(worker);
        Ok(tx)
    }

    fn spawn_worker(&self, mtype: MessageType, dispatcher: &Dispatcher) -> Worker {
        let (tx, rx) = mpsc::channel(dispatcher.options.max_size_clamped());
        let assembler = Assembler {
            mtype,
            handler: dispatcher.handler.clone(),
            options: dispatcher.options,
            store: self.store.clone(),
            cursor: self.cursor.clone(),
            bus: self.bus.clone(),
            retry: self.retry,
        };
        let join = tokio::spawn(assembler.run(rx, self.token.child_token()));

        self.bus
            .publish(Event::now(EventKind::AssemblerSpawned).with_mtype(mtype));
        debug!(mtype = %mtype, "assembler spawned");
        Worker { tx, join }
    }

    /// Drops every worker's intake and waits for the workers to exit.
    /// Called during shutdown after the root token is cancelled.
    pub async fn close_and_join(&self) {
        let workers: Vec<Worker> = {
            let mut dispatchers = self.dispatchers.lock().await;
            dispatchers
                .values_mut()
                .filter_map(|d| d.worker.take())
                .collect()
        };
        for worker in workers {
            drop(worker.tx);
            let _ = worker.join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchFn;
    use crate::memory::MemoryStore;
    use crate::model::{Batch, Message};
    use std::time::Duration;

    fn registry() -> (Arc<Registry>, Bus, CancellationToken) {
        let store = Arc::new(MemoryStore::new());
        let bus = Bus::new(64);
        let cursor = Arc::new(OffsetCursor::new(
            store.clone(),
            Retry::default(),
            bus.clone(),
        ));
        let token = CancellationToken::new();
        let registry = Arc::new(Registry::new(
            store,
            cursor,
            bus.clone(),
            Retry::default(),
            token.clone(),
        ));
        (registry, bus, token)
    }

    fn work(seq: i64) -> BatchWork {
        BatchWork {
            message: Message::new(MessageType::Private, "ns1", "0x12345", seq),
            data: vec![],
        }
    }

    #[tokio::test]
    async fn unregistered_types_are_unroutable() {
        let (registry, _bus, _token) = registry();
        let err = registry.route(work(1)).await;
        assert!(matches!(err, Err(DispatchError::Unroutable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn first_route_spawns_the_worker() {
        let (registry, bus, token) = registry();
        let (tx, mut batches) = mpsc::unbounded_channel();
        let handler = DispatchFn::arc(move |_ctx, batch: Batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
                Ok::<(), DispatchError>(())
            }
        });
        registry
            .register(
                MessageType::Private,
                handler,
                Options {
                    batch_max_size: 1,
                    batch_timeout: Duration::ZERO,
                    dispose_timeout: Duration::ZERO,
                },
            )
            .await;

        let mut events = bus.subscribe();
        registry.route(work(1)).await.unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind, EventKind::AssemblerSpawned);

        let batch = tokio::time::timeout(Duration::from_secs(5), batches.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.sequences(), vec![1]);

        token.cancel();
        registry.close_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_worker_is_respawned_on_demand() {
        let (registry, bus, token) = registry();
        let (tx, mut batches) = mpsc::unbounded_channel();
        let handler = DispatchFn::arc(move |_ctx, batch: Batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
                Ok::<(), DispatchError>(())
            }
        });
        registry
            .register(
                MessageType::Private,
                handler,
                Options {
                    batch_max_size: 1,
                    batch_timeout: Duration::ZERO,
                    dispose_timeout: Duration::from_millis(100),
                },
            )
            .await;

        let mut events = bus.subscribe();
        registry.route(work(1)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), batches.recv())
            .await
            .unwrap()
            .unwrap();

        // Idle long enough for the worker to tear itself down.
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if ev.kind == EventKind::AssemblerDisposed {
                break;
            }
        }

        registry.route(work(2)).await.unwrap();
        let batch = tokio::time::timeout(Duration::from_secs(5), batches.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.sequences(), vec![2]);

        token.cancel();
        registry.close_and_join().await;
    }
}
