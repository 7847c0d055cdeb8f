//! Messages and their data references.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message classification.
///
/// Batching policy is registered per type; a batch never mixes types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Visible to every member of the namespace.
    Broadcast,
    /// Addressed to an explicit recipient group.
    Private,
    /// System definition messages (schemas, registrations).
    Definition,
}

impl MessageType {
    /// Returns the wire/display name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Broadcast => "broadcast",
            MessageType::Private => "private",
            MessageType::Definition => "definition",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference from a message to a data record.
///
/// A reference is satisfiable only when a [`Data`](crate::model::Data)
/// record with a matching id exists. Hash agreement is a caller concern,
/// not enforced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    /// Identity of the referenced data record.
    pub id: Uuid,
    /// Content hash recorded at reference time.
    pub hash: String,
}

/// A single entry in the persisted message log.
///
/// Immutable once written except for the `batch` assignment, which is set
/// exactly once by the transactional commit step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identity.
    pub id: Uuid,
    /// Message classification; selects the dispatcher.
    pub mtype: MessageType,
    /// Owning namespace.
    pub namespace: String,
    /// Identity of the author.
    pub author: String,
    /// Monotonically increasing position in the log.
    pub sequence: i64,
    /// Ordered references to the message's data records.
    pub data: Vec<DataRef>,
    /// The batch this message was committed into, if any.
    pub batch: Option<Uuid>,
}

impl Message {
    /// Creates an unbatched message at the given log position.
    pub fn new(
        mtype: MessageType,
        namespace: impl Into<String>,
        author: impl Into<String>,
        sequence: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mtype,
            namespace: namespace.into(),
            author: author.into(),
            sequence,
            data: Vec::new(),
            batch: None,
        }
    }

    /// Appends a data reference.
    pub fn with_data_ref(mut self, id: Uuid, hash: impl Into<String>) -> Self {
        self.data.push(DataRef {
            id,
            hash: hash.into(),
        });
        self
    }
}
