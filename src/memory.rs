//! # In-memory store and resolver.
//!
//! [`MemoryStore`] implements both collaborator traits over plain maps. It
//! exists for tests and demos: `run_as_group` takes a full state snapshot
//! and restores it on error, which gives honest all-or-nothing semantics
//! for a single in-flight group (the engine never overlaps groups that
//! touch the same messages).
//!
//! Test hooks:
//! - [`MemoryStore::fail_next`] scripts transient failures per operation;
//! - [`MemoryStore::calls`] counts invocations per operation.
//!
//! As a [`DataResolver`] it is authoritative: it always reports a complete
//! answer, so an absent data record surfaces as the distinct missing-data
//! condition rather than a deferral.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::model::{Batch, Data, Message, Offset, OffsetKind};
use crate::resolver::DataResolver;
use crate::store::Store;

#[derive(Default, Clone)]
struct State {
    offsets: HashMap<(OffsetKind, String, String), Offset>,
    messages: Vec<Message>,
    batches: Vec<Batch>,
    data: HashMap<Uuid, Data>,
}

/// In-memory [`Store`] + [`DataResolver`] with scripted-failure hooks.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    faults: Mutex<HashMap<&'static str, usize>>,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message into the log.
    pub async fn seed_message(&self, message: Message) {
        self.state.lock().await.messages.push(message);
    }

    /// Inserts a data record.
    pub async fn seed_data(&self, data: Data) {
        self.state.lock().await.data.insert(data.id, data);
    }

    /// Inserts an offset record.
    pub async fn seed_offset(&self, offset: Offset) {
        let key = (
            offset.kind,
            offset.namespace.clone(),
            offset.name.clone(),
        );
        self.state.lock().await.offsets.insert(key, offset);
    }

    /// Makes the next `times` invocations of `op` fail with a transient
    /// store error. Operation names match the [`Store`] method names.
    pub async fn fail_next(&self, op: &'static str, times: usize) {
        *self.faults.lock().await.entry(op).or_insert(0) += times;
    }

    /// Number of times `op` has been invoked.
    pub async fn calls(&self, op: &'static str) -> usize {
        self.counts.lock().await.get(op).copied().unwrap_or(0)
    }

    /// All persisted batches.
    pub async fn batches(&self) -> Vec<Batch> {
        self.state.lock().await.batches.clone()
    }

    /// A message by id, with its current batch assignment.
    pub async fn message(&self, id: Uuid) -> Option<Message> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    /// The current value of a named offset, if the record exists.
    pub async fn offset_value(
        &self,
        kind: OffsetKind,
        namespace: &str,
        name: &str,
    ) -> Option<i64> {
        self.state
            .lock()
            .await
            .offsets
            .get(&(kind, namespace.to_string(), name.to_string()))
            .map(|o| o.current)
    }

    async fn enter(&self, op: &'static str) -> Result<(), DispatchError> {
        *self.counts.lock().await.entry(op).or_insert(0) += 1;
        let mut faults = self.faults.lock().await;
        if let Some(remaining) = faults.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DispatchError::Store {
                    error: format!("injected {op} failure"),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_offset(
        &self,
        kind: OffsetKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Offset>, DispatchError> {
        self.enter("get_offset").await?;
        Ok(self
            .state
            .lock()
            .await
            .offsets
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn upsert_offset(&self, offset: &Offset) -> Result<(), DispatchError> {
        self.enter("upsert_offset").await?;
        let key = (
            offset.kind,
            offset.namespace.clone(),
            offset.name.clone(),
        );
        self.state.lock().await.offsets.insert(key, offset.clone());
        Ok(())
    }

    async fn update_offset(
        &self,
        kind: OffsetKind,
        namespace: &str,
        name: &str,
        current: i64,
    ) -> Result<(), DispatchError> {
        self.enter("update_offset").await?;
        let mut state = self.state.lock().await;
        let key = (kind, namespace.to_string(), name.to_string());
        match state.offsets.get_mut(&key) {
            Some(offset) => {
                offset.current = current;
                Ok(())
            }
            None => Err(DispatchError::Store {
                error: format!("offset {namespace}/{name} not found"),
            }),
        }
    }

    async fn get_messages_after(
        &self,
        sequence: i64,
        limit: usize,
    ) -> Result<Vec<Message>, DispatchError> {
        self.enter("get_messages_after").await?;
        let state = self.state.lock().await;
        let mut page: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.batch.is_none() && m.sequence > sequence)
            .cloned()
            .collect();
        page.sort_by_key(|m| m.sequence);
        page.truncate(limit);
        Ok(page)
    }

    async fn upsert_batch(&self, batch: &Batch) -> Result<(), DispatchError> {
        self.enter("upsert_batch").await?;
        let mut state = self.state.lock().await;
        state.batches.retain(|b| b.id != batch.id);
        state.batches.push(batch.clone());
        Ok(())
    }

    async fn mark_batched(&self, ids: &[Uuid], batch: Uuid) -> Result<(), DispatchError> {
        self.enter("mark_batched").await?;
        let mut state = self.state.lock().await;
        for message in state.messages.iter_mut() {
            if ids.contains(&message.id) {
                message.batch = Some(batch);
            }
        }
        Ok(())
    }

    async fn run_as_group<'a>(
        &'a self,
        work: BoxFuture<'a, Result<(), DispatchError>>,
    ) -> Result<(), DispatchError> {
        self.enter("run_as_group").await?;
        // Snapshot outside the work future; the lock must not be held
        // across it.
        let snapshot = self.state.lock().await.clone();
        match work.await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.lock().await = snapshot;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl DataResolver for MemoryStore {
    async fn resolve(&self, message: &Message) -> Result<(Vec<Data>, bool), DispatchError> {
        self.enter("resolve").await?;
        let state = self.state.lock().await;
        let resolved: Vec<Data> = message
            .data
            .iter()
            .filter_map(|r| state.data.get(&r.id).cloned())
            .collect();
        Ok((resolved, true))
    }
}
