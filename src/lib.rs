//! # Live Relay
//!
//! A relay between a remote live-stream platform and local WebSocket
//! clients. One side holds signed connections to the platform's stream
//! push service and decodes its compressed protobuf frames; the other side
//! serves local clients with a topic-based pub/sub protocol over plain
//! WebSocket.
//!
//! ## Modules
//!
//! - [`signature`]: Tokens and request signing for the platform handshake
//! - [`protocol`]: Wire frame decoding (gzip + protobuf envelope)
//! - [`stream`]: Per-room stream client with heartbeat and reconnection
//! - [`relay`]: Local connection hub and the JSON control protocol
//! - [`orchestrator`]: Binds watched rooms to relay topics
//! - [`api`]: Axum HTTP/WebSocket server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use liverelay::api::{serve, ApiConfig, AppState};
//! use liverelay::orchestrator::Orchestrator;
//! use liverelay::relay::{HubConfig, RelayHub};
//! use liverelay::signature::UnavailableSigner;
//! use liverelay::stream::StreamConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(RelayHub::new(HubConfig::default()));
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         Arc::clone(&hub),
//!         StreamConfig::default(),
//!         Arc::new(UnavailableSigner),
//!     ));
//!
//!     let state = AppState::new(hub, orchestrator, ApiConfig::default());
//!     serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod orchestrator;
pub mod protocol;
pub mod relay;
pub mod signature;
pub mod stream;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig};

pub use orchestrator::{Orchestrator, RoomStatus, WatchError};

pub use protocol::{decode_frame, ChatMessage, CodecError, GiftMessage};

pub use relay::{ControlMessage, HubConfig, HubError, RelayHub};

pub use signature::{CommandSigner, SignatureError, Signer, UnavailableSigner};

pub use stream::{ConnectionState, LiveStreamClient, StreamConfig, StreamError, StreamEvent};
