//! Live Stream Client
//!
//! Owns one authenticated connection to the remote platform per watched
//! room: builds the signed connection URL, runs the receive and heartbeat
//! loops, supervises reconnection, and emits typed events on a channel.
//!
//! Errors during setup surface to the caller; errors after the connection
//! is live are logged and healed by reconnection, never surfaced. The
//! client is designed to stay eventually-connected once watching.

mod client;
mod session;

pub use client::{ConnectionState, LiveStreamClient, StreamEvent};
pub use session::{extract_room_id, RoomSession};

use std::time::Duration;

use thiserror::Error;

use crate::signature::SignatureError;

/// Errors surfaced while setting up a stream connection
#[derive(Debug, Error)]
pub enum StreamError {
    /// `connect` was called while a connection is open or opening
    #[error("already connected")]
    AlreadyConnected,

    /// Session token or signature could not be produced
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The room's public page did not yield a long room id
    #[error("room id resolution failed: {reason}; page excerpt: {excerpt:?}")]
    RoomIdResolution { reason: String, excerpt: String },

    /// The stream socket could not be opened
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

/// Remote platform endpoints and connection parameters.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Landing/room page base URL, trailing slash included
    pub base_url: String,
    /// Stream push endpoint (wss)
    pub ws_endpoint: String,
    /// Browser-like identification header sent on every platform request
    pub user_agent: String,
    /// Heartbeat cadence while connected
    pub heartbeat_interval: Duration,
    /// Ceiling on the external signing step during connect
    pub sign_timeout: Duration,
    /// Reconnection policy for receive-loop failures
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://live.douyin.com/".to_string(),
            ws_endpoint: "wss://webcast5-ws-web-hl.douyin.com/webcast/im/push/v2/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            heartbeat_interval: Duration::from_secs(5),
            sign_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Bounded exponential backoff for receive-loop reconnection.
///
/// What "give up" looks like is deliberately a policy knob: when
/// `max_attempts` is exhausted the client stays disconnected until watched
/// again.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (zero-based), doubling up to
    /// the ceiling.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(20),
            max_attempts: 5,
        };

        assert_eq!(policy.delay_for(0), Duration::from_secs(3));
        assert_eq!(policy.delay_for(1), Duration::from_secs(6));
        assert_eq!(policy.delay_for(2), Duration::from_secs(12));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
        assert_eq!(policy.delay_for(30), Duration::from_secs(20));
    }
}
