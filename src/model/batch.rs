//! Batches: committed groups of messages plus their resolved data.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Data, Message};

/// Member messages and resolved data carried by a batch.
///
/// Messages keep their log sequence order. Data records are deduplicated
/// by id but keep first-reference order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BatchPayload {
    /// Member messages, in log sequence order.
    pub messages: Vec<Message>,
    /// Resolved data referenced by the member messages.
    pub data: Vec<Data>,
}

/// A committed, ordered group of messages of a single type.
///
/// Created transiently by an assembler, persisted exactly once at commit,
/// and dispatched to its type's handler as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Unique identity.
    pub id: Uuid,
    /// Owning namespace (taken from the first member message).
    pub namespace: String,
    /// Author of the first member message.
    pub author: String,
    /// Member messages and their resolved data.
    pub payload: BatchPayload,
    /// Wall-clock creation time.
    pub created: SystemTime,
}

impl Batch {
    /// Opens a fresh, empty batch in the given namespace.
    pub fn new(namespace: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            author: author.into(),
            payload: BatchPayload::default(),
            created: SystemTime::now(),
        }
    }

    /// Appends a member message and its resolved data.
    ///
    /// Data records already present in the payload (by id) are skipped so
    /// that shared references are carried once.
    pub fn push(&mut self, message: Message, data: Vec<Data>) {
        for d in data {
            if !self.payload.data.iter().any(|have| have.id == d.id) {
                self.payload.data.push(d);
            }
        }
        self.payload.messages.push(message);
    }

    /// Number of member messages.
    pub fn len(&self) -> usize {
        self.payload.messages.len()
    }

    /// True when the batch has no members.
    pub fn is_empty(&self) -> bool {
        self.payload.messages.is_empty()
    }

    /// Identities of all member messages.
    pub fn message_ids(&self) -> Vec<Uuid> {
        self.payload.messages.iter().map(|m| m.id).collect()
    }

    /// Log sequences of all member messages.
    pub fn sequences(&self) -> Vec<i64> {
        self.payload.messages.iter().map(|m| m.sequence).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;
    use serde_json::json;

    #[test]
    fn push_keeps_sequence_order_and_dedupes_data() {
        let mut batch = Batch::new("ns1", "0x12345");
        let shared = Data::new(Uuid::new_v4(), "aa", json!({"k": 1}));

        let m1 = Message::new(MessageType::Broadcast, "ns1", "0x12345", 1)
            .with_data_ref(shared.id, "aa");
        let m2 = Message::new(MessageType::Broadcast, "ns1", "0x12345", 2)
            .with_data_ref(shared.id, "aa");

        batch.push(m1.clone(), vec![shared.clone()]);
        batch.push(m2.clone(), vec![shared.clone()]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.sequences(), vec![1, 2]);
        assert_eq!(batch.payload.data.len(), 1);
        assert_eq!(batch.message_ids(), vec![m1.id, m2.id]);
    }
}
