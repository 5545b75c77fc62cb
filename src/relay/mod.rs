//! Local WebSocket Relay
//!
//! Manages every locally accepted client connection, the topic subscription
//! registry, and the JSON control protocol that routes messages between
//! clients and topics.
//!
//! ## Architecture
//!
//! - **RelayHub**: connection table + subscription registry, safe to mutate
//!   from many concurrent connection loops
//! - **Handler**: WebSocket upgrade, per-connection receive loop, text
//!   frame routing
//! - **Messages**: control envelope, acknowledgements, forwarded wrappers
//!
//! ## Protocol
//!
//! Clients connect to `/ws` and send text frames. A literal `heartbeat` is
//! answered with `heartbeat_ack`. JSON objects with a `type` field are
//! control messages:
//!
//! ```json
//! {"type": "subscribe", "topic": "room:42"}
//! {"type": "unsubscribe", "topic": "room:42"}
//! {"type": "direct", "targetId": "<connection id>", "content": ...}
//! {"type": "topic", "topic": "room:42", "content": ...}
//! ```
//!
//! Anything else is broadcast to every other connection, tagged with the
//! sender id, for backward compatibility.

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHandle, ConnectionId, HubConfig, HubError, RelayHub};
pub use messages::{Ack, AckStatus, ControlMessage, ForwardedMessage, HEARTBEAT, HEARTBEAT_ACK};
