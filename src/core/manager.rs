//! # The batch manager: lifecycle root of the engine.
//!
//! Owns the collaborators and the background tasks:
//!
//! ```text
//!                      ┌────────────────────────────────────────┐
//!                      │              BatchManager              │
//!                      │                                        │
//!   notify(seq) ──────►│ notifier ──tap──► sequencer ──┐        │
//!                      │                     │         │ route  │
//!                      │              OffsetCursor     ▼        │
//!                      │                     ▲     assemblers   │
//!                      │     writer ◄────────┴──────── │        │
//!                      │       │ persist               │ commit │
//!                      └───────┼───────────────────────┼────────┘
//!                              ▼                       ▼
//!                            store                 store+handler
//! ```
//!
//! Lifecycle: `build → register_dispatcher → start → … → close →
//! wait_stop`. `start` restores the durable offset first and refuses to
//! run without it. `close` requests a graceful stop and returns
//! immediately; `wait_stop` joins every background task. Both are
//! idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::dispatch::{DispatchRef, Options};
use crate::error::EngineError;
use crate::events::{Bus, Event, EventKind};
use crate::model::MessageType;
use crate::policies::Retry;
use crate::resolver::DataResolver;
use crate::store::Store;

use super::builder::BatchManagerBuilder;
use super::notify::Notifier;
use super::offset::OffsetCursor;
use super::registry::Registry;
use super::sequencer::Sequencer;

#[derive(Default)]
struct Handles {
    hints_rx: Option<mpsc::Receiver<i64>>,
    sequencer: Option<JoinHandle<()>>,
    notifier: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// Durable batch-assembly and dispatch engine.
pub struct BatchManager {
    cfg: Config,
    bus: Bus,
    store: Arc<dyn Store>,
    resolver: Arc<dyn DataResolver>,
    registry: Arc<Registry>,
    cursor: Arc<OffsetCursor>,
    notifier: Notifier,
    token: CancellationToken,
    retry: Retry,
    started: AtomicBool,
    closed: AtomicBool,
    handles: Mutex<Handles>,
}

impl BatchManager {
    /// Entry point: a builder over the given configuration.
    pub fn builder(cfg: Config) -> BatchManagerBuilder {
        BatchManagerBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        cfg: Config,
        bus: Bus,
        store: Arc<dyn Store>,
        resolver: Arc<dyn DataResolver>,
        registry: Arc<Registry>,
        cursor: Arc<OffsetCursor>,
        notifier: Notifier,
        hints_rx: mpsc::Receiver<i64>,
        token: CancellationToken,
        retry: Retry,
    ) -> Self {
        Self {
            cfg,
            bus,
            store,
            resolver,
            registry,
            cursor,
            notifier,
            token,
            retry,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            handles: Mutex::new(Handles {
                hints_rx: Some(hints_rx),
                ..Handles::default()
            }),
        }
    }

    /// Registers the handler and batching options for a message type.
    ///
    /// May be called before or after [`start`](Self::start); a type
    /// registered late simply begins routing on the next pass.
    pub async fn register_dispatcher(
        &self,
        mtype: MessageType,
        handler: DispatchRef,
        options: Options,
    ) {
        self.registry.register(mtype, handler, options).await;
    }

    /// Restores the durable offset and spawns the background tasks.
    ///
    /// Returns [`EngineError::OffsetRestore`] without spawning anything if
    /// the offset record cannot be read or created; the manager is left
    /// unstarted so the caller may retry. A second call while running
    /// returns [`EngineError::AlreadyStarted`].
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }

        let restored = match self.cursor.restore().await {
            Ok(restored) => restored,
            Err(source) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(EngineError::OffsetRestore { source });
            }
        };
        self.bus
            .publish(Event::now(EventKind::OffsetRestored).with_offset(restored));

        let mut handles = self.handles.lock().await;
        let Some(hints_rx) = handles.hints_rx.take() else {
            return Err(EngineError::AlreadyStarted);
        };
        let (tap_tx, tap_rx) = mpsc::channel(1);

        handles.writer = Some(self.cursor.clone().spawn_writer(self.token.clone()));
        handles.notifier = Some(Notifier::spawn_drain(
            hints_rx,
            tap_tx,
            self.token.clone(),
        ));

        let sequencer = Sequencer {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            registry: self.registry.clone(),
            cursor: self.cursor.clone(),
            bus: self.bus.clone(),
            retry: self.retry,
            page_size: self.cfg.page_size_clamped(),
            poll_timeout: self.cfg.poll_timeout,
            tap: tap_rx,
            token: self.token.clone(),
        };
        handles.sequencer = Some(tokio::spawn(sequencer.run()));

        info!(offset = restored, "batch manager started");
        Ok(())
    }

    /// A cloneable hint sender for producers. Sending is optional — the
    /// poll timeout covers missed hints.
    pub fn new_messages(&self) -> mpsc::Sender<i64> {
        self.notifier.sender()
    }

    /// Hints that a message with the given sequence was inserted.
    pub fn notify(&self, seq: i64) {
        self.notifier.hint(seq);
    }

    /// Subscribes to the engine's lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Requests a graceful stop and returns immediately. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.token.cancel();
        info!("shutdown requested");
    }

    /// Waits for every background task to exit. Implies [`close`](Self::close).
    pub async fn wait_stop(&self) {
        self.close();
        let (sequencer, notifier, writer) = {
            let mut handles = self.handles.lock().await;
            (
                handles.sequencer.take(),
                handles.notifier.take(),
                handles.writer.take(),
            )
        };
        if let Some(h) = sequencer {
            let _ = h.await;
        }
        self.registry.close_and_join().await;
        if let Some(h) = notifier {
            let _ = h.await;
        }
        if let Some(h) = writer {
            let _ = h.await;
        }
        info!("batch manager stopped");
    }
}
