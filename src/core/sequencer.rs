//! # The message sequencer.
//!
//! Single reader of the durable message log. Each pass pages unbatched
//! messages strictly after the cursor watermark, resolves their data, and
//! routes them to the per-type assemblers:
//!
//! ```text
//!   wake (tap | poll timeout)
//!     └► read page after watermark (retried)
//!          └► per message:
//!               already routed      → skip
//!               data incomplete     → defer        (cursor gates)
//!               data unresolvable   → defer + event
//!               no dispatcher       → drop + advance
//!               routable            → track, route to assembler
//!     full page → read again immediately; else wait for next wake
//! ```
//!
//! The sequencer never waits on a handler. Its only coupling to dispatch
//! speed is the bounded intake of each type's assembler, so one slow type
//! throttles its own routing while other types keep flowing.
//!
//! Deferred messages are not remembered between passes — they are simply
//! re-read, because the cursor never advanced past them. Routed messages
//! are remembered (and skipped) until their batch commits or rolls back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{Data, Message};
use crate::policies::Retry;
use crate::resolver::DataResolver;
use crate::store::Store;

use super::assembler::BatchWork;
use super::offset::OffsetCursor;
use super::registry::Registry;

/// The polling read-and-route loop.
pub struct Sequencer {
    pub store: Arc<dyn Store>,
    pub resolver: Arc<dyn DataResolver>,
    pub registry: Arc<Registry>,
    pub cursor: Arc<OffsetCursor>,
    pub bus: Bus,
    pub retry: Retry,
    pub page_size: usize,
    pub poll_timeout: Duration,
    pub tap: mpsc::Receiver<()>,
    pub token: CancellationToken,
}

impl Sequencer {
    /// Runs until the token is cancelled.
    pub async fn run(mut self) {
        loop {
            if self.token.is_cancelled() {
                break;
            }

            let after = self.cursor.current().await;
            let limit = self.page_size.max(1);
            let page = match self
                .retry
                .run(&self.token, |_| {
                    let store = self.store.clone();
                    async move { store.get_messages_after(after, limit).await }
                })
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    if !matches!(e, DispatchError::Store { .. }) || !self.token.is_cancelled() {
                        warn!(error = %e, "sequencer read abandoned");
                    }
                    break;
                }
            };

            let full = page.len() == limit;
            self.process_page(page).await;

            // A full page means there is probably more backlog; skip the
            // wait and read again.
            if full {
                continue;
            }
            if !self.wait().await {
                break;
            }
        }

        info!("sequencer stopped");
        self.bus.publish(Event::now(EventKind::SequencerStopped));
    }

    async fn process_page(&self, page: Vec<Message>) {
        for message in page {
            if self.token.is_cancelled() {
                return;
            }
            let seq = message.sequence;
            if self.cursor.is_claimed(seq).await {
                continue;
            }

            match self.assemble(&message).await {
                Ok(Some(data)) => {
                    let mtype = message.mtype;
                    let id = message.id;
                    // Track before the hand-off so a commit racing ahead
                    // of us still finds the sequence gated.
                    self.cursor.track(seq).await;
                    match self.registry.route(BatchWork { message, data }).await {
                        Ok(()) => {}
                        Err(DispatchError::Unroutable { .. }) => {
                            warn!(message_id = %id, mtype = %mtype, "message unroutable, dropping");
                            self.bus.publish(
                                Event::now(EventKind::MessageUnroutable)
                                    .with_message(id)
                                    .with_mtype(mtype),
                            );
                            // Dropped from active processing; the cursor
                            // may pass it.
                            self.cursor.complete(&[seq]).await;
                        }
                        Err(DispatchError::Saturated { .. }) => {
                            // Backpressure from this type only; the
                            // message is re-read on the next wake.
                            debug!(message_id = %id, mtype = %mtype, "intake full, deferring");
                            self.cursor.requeue(&[seq]).await;
                            self.bus.publish(
                                Event::now(EventKind::MessageDeferred)
                                    .with_message(id)
                                    .with_mtype(mtype),
                            );
                        }
                        Err(e) => {
                            warn!(message_id = %id, error = %e, "route failed, requeueing");
                            self.cursor.requeue(&[seq]).await;
                        }
                    }
                }
                Ok(None) => {
                    self.cursor.defer(seq).await;
                    self.bus.publish(
                        Event::now(EventKind::MessageDeferred)
                            .with_message(message.id)
                            .with_mtype(message.mtype),
                    );
                }
                Err(DispatchError::MissingData { message: id }) => {
                    warn!(message_id = %id, "message references unresolvable data");
                    self.cursor.defer(seq).await;
                    self.bus.publish(
                        Event::now(EventKind::MessageMissingData)
                            .with_message(id)
                            .with_reason("missing_data"),
                    );
                }
                Err(e) => {
                    // Lookup infrastructure failure: abandon the rest of
                    // the pass, the next wake re-reads from the watermark.
                    warn!(error = %e, "data resolution failed, abandoning pass");
                    return;
                }
            }
        }
    }

    /// Resolves a message's data.
    ///
    /// - `Ok(Some(data))` — complete, ready to route
    /// - `Ok(None)` — not all data has arrived; defer
    /// - `Err(MissingData)` — the resolver's answer is final and short
    async fn assemble(&self, message: &Message) -> Result<Option<Vec<Data>>, DispatchError> {
        if message.data.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let (data, complete) = self.resolver.resolve(message).await?;
        if !complete {
            return Ok(None);
        }
        if data.len() != message.data.len() {
            return Err(DispatchError::MissingData {
                message: message.id,
            });
        }
        Ok(Some(data))
    }

    /// Waits for a shoulder tap or the poll timeout. Returns `false` when
    /// the loop should exit.
    async fn wait(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            tap = self.tap.recv() => tap.is_some(),
            _ = time::sleep(self.poll_timeout) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchFn, Options};
    use crate::memory::MemoryStore;
    use crate::model::{Batch, MessageType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    /// Resolver whose completeness answer can be flipped at runtime.
    struct GatedResolver {
        inner: Arc<MemoryStore>,
        complete: AtomicBool,
    }

    #[async_trait]
    impl DataResolver for GatedResolver {
        async fn resolve(&self, message: &Message) -> Result<(Vec<Data>, bool), DispatchError> {
            if !self.complete.load(Ordering::SeqCst) {
                return Ok((Vec::new(), false));
            }
            self.inner.resolve(message).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        cursor: Arc<OffsetCursor>,
        registry: Arc<Registry>,
        bus: Bus,
        token: CancellationToken,
        tap: mpsc::Sender<()>,
    }

    fn sequencer(resolver: Arc<dyn DataResolver>) -> (Sequencer, Fixture) {
        let store = Arc::new(MemoryStore::new());
        let bus = Bus::new(256);
        let token = CancellationToken::new();
        let cursor = Arc::new(OffsetCursor::new(
            store.clone(),
            Retry::default(),
            bus.clone(),
        ));
        let registry = Arc::new(Registry::new(
            store.clone(),
            cursor.clone(),
            bus.clone(),
            Retry::default(),
            token.clone(),
        ));
        let (tap, tap_rx) = mpsc::channel(1);
        let seq = Sequencer {
            store: store.clone(),
            resolver,
            registry: registry.clone(),
            cursor: cursor.clone(),
            bus: bus.clone(),
            retry: Retry::default(),
            page_size: 100,
            poll_timeout: Duration::from_secs(30),
            tap: tap_rx,
            token: token.clone(),
        };
        (
            seq,
            Fixture {
                store,
                cursor,
                registry,
                bus,
                token,
                tap,
            },
        )
    }

    async fn wait_for(
        events: &mut tokio::sync::broadcast::Receiver<Event>,
        kind: EventKind,
    ) -> Event {
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(60), events.recv())
                .await
                .expect("event within window")
                .unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unroutable_messages_are_dropped_and_passed() {
        let (seq, fx) = sequencer(Arc::new(MemoryStore::new()));
        let msg = Message::new(MessageType::Definition, "ns1", "0x12345", 1);
        let id = msg.id;
        fx.store.seed_message(msg).await;

        let mut events = fx.bus.subscribe();
        let run = tokio::spawn(seq.run());

        let ev = wait_for(&mut events, EventKind::MessageUnroutable).await;
        assert_eq!(ev.message, Some(id));
        for _ in 0..50 {
            if fx.cursor.current().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(fx.cursor.current().await, 1);

        fx.token.cancel();
        run.await.unwrap();
        wait_for(&mut events, EventKind::SequencerStopped).await;
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_data_defers_until_it_arrives() {
        let store_behind = Arc::new(MemoryStore::new());
        let resolver = Arc::new(GatedResolver {
            inner: store_behind.clone(),
            complete: AtomicBool::new(false),
        });
        let (seq, fx) = sequencer(resolver.clone());

        let (tx, mut batches) = mpsc::unbounded_channel();
        let handler = DispatchFn::arc(move |_ctx, batch: Batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
                Ok::<(), DispatchError>(())
            }
        });
        fx.registry
            .register(
                MessageType::Broadcast,
                handler,
                Options {
                    batch_max_size: 1,
                    batch_timeout: Duration::ZERO,
                    dispose_timeout: Duration::ZERO,
                },
            )
            .await;

        let data = Data::new(Uuid::new_v4(), "aa", serde_json::json!("v"));
        let msg = Message::new(MessageType::Broadcast, "ns1", "0x12345", 1)
            .with_data_ref(data.id, "aa");
        fx.store.seed_message(msg).await;
        store_behind.seed_data(data).await;

        let mut events = fx.bus.subscribe();
        let run = tokio::spawn(seq.run());

        wait_for(&mut events, EventKind::MessageDeferred).await;
        assert_eq!(fx.cursor.current().await, 0);
        assert!(batches.try_recv().is_err());

        // The data arrives; the next tap routes the message.
        resolver.complete.store(true, Ordering::SeqCst);
        fx.tap.try_send(()).unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(60), batches.recv())
            .await
            .expect("batch after data arrival")
            .unwrap();
        assert_eq!(batch.sequences(), vec![1]);

        fx.token.cancel();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_data_is_reported_and_gates_the_cursor() {
        let (seq, fx) = sequencer(Arc::new(MemoryStore::new()));
        // Data ref with no backing record: the MemoryStore resolver gives
        // a complete-but-short answer.
        let msg = Message::new(MessageType::Broadcast, "ns1", "0x12345", 1)
            .with_data_ref(Uuid::new_v4(), "aa");
        let id = msg.id;
        fx.store.seed_message(msg).await;

        let mut events = fx.bus.subscribe();
        let run = tokio::spawn(seq.run());

        let ev = wait_for(&mut events, EventKind::MessageMissingData).await;
        assert_eq!(ev.message, Some(id));
        assert_eq!(ev.reason.as_deref(), Some("missing_data"));
        assert_eq!(fx.cursor.current().await, 0);

        fx.token.cancel();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn a_stale_page_does_not_rebatch_committed_messages() {
        let (seq, fx) = sequencer(Arc::new(MemoryStore::new()));

        let (tx, mut batches) = mpsc::unbounded_channel();
        let handler = DispatchFn::arc(move |_ctx, batch: Batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
                Ok::<(), DispatchError>(())
            }
        });
        fx.registry
            .register(
                MessageType::Broadcast,
                handler,
                Options {
                    batch_max_size: 1,
                    batch_timeout: Duration::ZERO,
                    dispose_timeout: Duration::ZERO,
                },
            )
            .await;

        let msg = Message::new(MessageType::Broadcast, "ns1", "0x12345", 2);
        fx.store.seed_message(msg.clone()).await;

        // Page read taken before the commit below became visible.
        let stale = fx.store.get_messages_after(0, 100).await.unwrap();
        assert_eq!(stale.len(), 1);

        // The message commits while a lower sequence still gates the
        // watermark, so `current` cannot pass it yet.
        let mut committed = Batch::new("ns1", "0x12345");
        committed.push(msg.clone(), vec![]);
        fx.store.upsert_batch(&committed).await.unwrap();
        fx.store.mark_batched(&[msg.id], committed.id).await.unwrap();
        fx.cursor.defer(1).await;
        fx.cursor.track(2).await;
        fx.cursor.complete(&[2]).await;
        assert_eq!(fx.cursor.current().await, 0);

        // The stale page still lists the message as unbatched; it must
        // not be routed into a second batch.
        seq.process_page(stale).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(fx.store.batches().await.len(), 1);
        assert!(batches.try_recv().is_err());

        fx.token.cancel();
        fx.registry.close_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn routed_messages_are_not_routed_twice() {
        let (seq, fx) = sequencer(Arc::new(MemoryStore::new()));

        let (tx, mut batches) = mpsc::unbounded_channel();
        let handler = DispatchFn::arc(move |_ctx, batch: Batch| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch);
                Ok::<(), DispatchError>(())
            }
        });
        // Batch stays open long enough for several sequencer passes.
        fx.registry
            .register(
                MessageType::Broadcast,
                handler,
                Options {
                    batch_max_size: 10,
                    batch_timeout: Duration::from_secs(2),
                    dispose_timeout: Duration::ZERO,
                },
            )
            .await;

        fx.store
            .seed_message(Message::new(MessageType::Broadcast, "ns1", "0x12345", 1))
            .await;

        let run = tokio::spawn(seq.run());

        // Extra taps force re-reads while the batch is still open.
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = fx.tap.try_send(());
        }

        let batch = tokio::time::timeout(Duration::from_secs(60), batches.recv())
            .await
            .expect("single batch")
            .unwrap();
        assert_eq!(batch.sequences(), vec![1]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(batches.try_recv().is_err());

        fx.token.cancel();
        run.await.unwrap();
    }
}
