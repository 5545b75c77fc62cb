//! Relay Control Protocol
//!
//! JSON message shapes exchanged with local relay clients. Inbound control
//! messages carry a `type` discriminator; outbound acknowledgements are
//! plain `{"status", "message"}` objects and forwarded messages are wrapped
//! with the sender's connection id.

use serde::{Deserialize, Serialize};

/// Literal text frame treated as a transport-level keepalive, never as
/// application data.
pub const HEARTBEAT: &str = "heartbeat";

/// Reply to a [`HEARTBEAT`] frame.
pub const HEARTBEAT_ACK: &str = "heartbeat_ack";

/// Control messages sent by relay clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Add a topic to this connection's subscription set
    Subscribe { topic: String },
    /// Remove a topic from this connection's subscription set
    Unsubscribe { topic: String },
    /// Forward content to a single connection by id
    Direct {
        #[serde(rename = "targetId")]
        target_id: String,
        content: serde_json::Value,
    },
    /// Forward content to every subscriber of a topic
    Topic {
        topic: String,
        content: serde_json::Value,
    },
}

/// Acknowledgement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Acknowledgement sent back to the client that issued a control message
#[derive(Debug, Clone, Serialize)]
pub struct Ack {
    pub status: AckStatus,
    pub message: String,
}

impl Ack {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
        }
    }

    /// Serialized form for the wire. An `Ack` is always serializable, so
    /// failures collapse to a minimal hand-built error object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"internal serialization error"}"#.to_string()
        })
    }
}

/// Messages forwarded between relay clients, tagged with the sender
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForwardedMessage {
    Direct {
        from: String,
        content: serde_json::Value,
    },
    Topic {
        from: String,
        topic: String,
        content: serde_json::Value,
    },
}

impl ForwardedMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"internal serialization error"}"#.to_string()
        })
    }
}
