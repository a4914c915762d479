//! Sync protocol message types
//!
//! Messages exchanged with the collaboration hub as JSON text frames.
//! Delta payloads are hex strings (see [`crate::codec`]).

use serde::{Deserialize, Serialize};

/// Messages sent to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for everything the hub has that our causal summary lacks
    SyncRequest {
        #[serde(rename = "stateVector")]
        state_vector: String,
    },

    /// A locally produced delta
    Update { update: String },
}

/// Messages received from the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot, first message of a session
    Sync { update: String },

    /// Incremental remote delta
    Update { update: String },

    /// Non-fatal problem reported by the hub
    Error { message: String },

    /// Advisory message
    Info { message: String },

    /// Any `type` this client does not know about
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn sync_request(state_vector: String) -> Self {
        ClientMessage::SyncRequest { state_vector }
    }

    pub fn update(update: String) -> Self {
        ClientMessage::Update { update }
    }

    /// Encode message as a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Decode a JSON text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Sync { .. } => "sync",
            ServerMessage::Update { .. } => "update",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Info { .. } => "info",
            ServerMessage::Unknown => "unknown",
        }
    }
}
