//! Wire format: one JSON object per line in each direction.

use crate::types::Did;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Originator of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SenderRef {
    /// Another agent in the directory.
    Agent(Did),
    /// An authenticated external caller (credential identity).
    External(String),
}

impl fmt::Display for SenderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderRef::Agent(did) => write!(f, "{}", did),
            SenderRef::External(caller) => write!(f, "external:{}", caller),
        }
    }
}

/// A message in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: SenderRef,
    pub recipient: Did,
    pub action: String,
    /// Opaque to the router; agents interpret it.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Delivery attempt this frame belongs to, starting at 1.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        sender: SenderRef,
        recipient: Did,
        action: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            recipient,
            action: action.into(),
            payload,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Reply an agent writes for every frame it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Ack {
    Accepted { message_id: String },
    /// Inbox full; the sender may retry.
    Busy,
    Rejected { reason: String },
}
