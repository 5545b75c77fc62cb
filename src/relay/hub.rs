//! Relay Connection Hub
//!
//! Owns every locally accepted WebSocket connection and the topic
//! subscription registry, and exposes the broadcast/direct/topic send
//! operations. All tables are internally locked and safe to mutate from
//! many concurrent connection loops; no socket handle ever leaves the loop
//! that accepted it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Unique identifier for a relay connection
pub type ConnectionId = String;

/// Manages all relay connections and topic subscriptions
pub struct RelayHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
    /// Topic index: topic → set of subscribed ConnectionIds
    topics: Arc<RwLock<HashMap<String, HashSet<ConnectionId>>>>,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the relay hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// Handle for one registered connection: the channel feeding its send task
/// plus the topics it is subscribed to.
pub struct ConnectionHandle {
    pub sender: mpsc::UnboundedSender<String>,
    pub subscriptions: HashSet<String>,
}

impl RelayHub {
    /// Create a new relay hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            topics: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Register a newly accepted connection and return its fresh id.
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(
            id.clone(),
            ConnectionHandle {
                sender,
                subscriptions: HashSet::new(),
            },
        );

        tracing::info!(
            connection_id = %id,
            total = connections.len(),
            "relay client connected"
        );
        Ok(id)
    }

    /// Unregister a connection and remove every trace of it from the
    /// subscription registry. Runs on every exit path of a connection loop.
    pub async fn unregister(&self, id: &str) {
        let handle = self.connections.write().await.remove(id);

        if let Some(handle) = handle {
            let mut topics = self.topics.write().await;
            for topic in handle.subscriptions {
                if let Some(subscribers) = topics.get_mut(&topic) {
                    subscribers.remove(id);
                    if subscribers.is_empty() {
                        topics.remove(&topic);
                    }
                }
            }
        }

        tracing::info!(connection_id = %id, "relay client disconnected");
    }

    /// Subscribe a connection to a topic. Idempotent: returns `false` when
    /// the topic was already in the connection's set.
    pub async fn subscribe(&self, id: &str, topic: &str) -> Result<bool, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections.get_mut(id).ok_or(HubError::ConnectionNotFound)?;

        let added = handle.subscriptions.insert(topic.to_string());
        if added {
            self.topics
                .write()
                .await
                .entry(topic.to_string())
                .or_insert_with(HashSet::new)
                .insert(id.to_string());
        }

        tracing::debug!(connection_id = %id, topic = %topic, added, "subscribe");
        Ok(added)
    }

    /// Unsubscribe a connection from a topic. Removing an absent topic is a
    /// no-op, not an error.
    pub async fn unsubscribe(&self, id: &str, topic: &str) -> Result<bool, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections.get_mut(id).ok_or(HubError::ConnectionNotFound)?;

        let removed = handle.subscriptions.remove(topic);
        if removed {
            let mut topics = self.topics.write().await;
            if let Some(subscribers) = topics.get_mut(topic) {
                subscribers.remove(id);
                if subscribers.is_empty() {
                    topics.remove(topic);
                }
            }
        }

        tracing::debug!(connection_id = %id, topic = %topic, removed, "unsubscribe");
        Ok(removed)
    }

    /// Send text to a single connection if it is still registered.
    ///
    /// A missing or closed recipient is a logged no-op, never an error:
    /// publishers must tolerate recipients that have disappeared.
    pub async fn send_to_connection(&self, id: &str, text: &str) {
        let connections = self.connections.read().await;
        match connections.get(id) {
            Some(handle) => {
                if handle.sender.send(text.to_string()).is_err() {
                    tracing::debug!(connection_id = %id, "send to closing connection dropped");
                }
            }
            None => {
                tracing::debug!(connection_id = %id, "send to unknown connection dropped");
            }
        }
    }

    /// Fan text out to every connection subscribed to `topic` at call time.
    ///
    /// Best-effort: a failure on one recipient is logged and does not abort
    /// delivery to the rest. Returns the number of successful sends.
    pub async fn send_to_topic(&self, topic: &str, text: &str) -> usize {
        let subscriber_ids = {
            let topics = self.topics.read().await;
            topics.get(topic).cloned().unwrap_or_default()
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for id in &subscriber_ids {
            if let Some(handle) = connections.get(id) {
                if handle.sender.send(text.to_string()).is_ok() {
                    delivered += 1;
                } else {
                    tracing::debug!(connection_id = %id, topic = %topic, "topic send dropped");
                }
            }
        }

        tracing::trace!(topic = %topic, delivered, "topic fan-out");
        delivered
    }

    /// Fan text out to every registered connection except the sender.
    /// Returns the number of successful sends.
    pub async fn broadcast(&self, sender_id: &str, text: &str) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (id, handle) in connections.iter() {
            if id == sender_id {
                continue;
            }
            if handle.sender.send(text.to_string()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(connection_id = %id, "broadcast send dropped");
            }
        }
        delivered
    }

    /// Best-effort close of every registered connection.
    ///
    /// Dropping a handle closes its channel, which ends the connection's
    /// send task and releases the socket. Both tables are cleared regardless
    /// of individual outcomes. Runs once at process start to discard state
    /// left over from a prior run.
    pub async fn close_all(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        self.topics.write().await.clear();

        if count > 0 {
            tracing::info!(closed = count, "closed all relay connections");
        }
    }

    /// Current number of registered connections (a recent snapshot).
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Current number of connections subscribed to a topic.
    pub async fn topic_subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

/// Errors that can occur in the relay hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("connection not found")]
    ConnectionNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = hub.register(tx).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = RelayHub::new(HubConfig { max_connections: 1 });
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        hub.register(tx1).await.unwrap();
        let result = hub.register(tx2).await;
        assert!(matches!(result, Err(HubError::TooManyConnections(1))));
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        assert!(hub.subscribe(&id, "room:1").await.unwrap());
        assert!(!hub.subscribe(&id, "room:1").await.unwrap());
        assert_eq!(hub.topic_subscriber_count("room:1").await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_absent_topic_is_noop() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        assert!(!hub.unsubscribe(&id, "room:1").await.unwrap());

        hub.subscribe(&id, "room:1").await.unwrap();
        assert!(hub.unsubscribe(&id, "room:1").await.unwrap());
        assert_eq!(hub.topic_subscriber_count("room:1").await, 0);
    }

    #[tokio::test]
    async fn test_send_to_topic_reaches_exactly_subscribers() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();

        let a = hub.register(tx_a).await.unwrap();
        let b = hub.register(tx_b).await.unwrap();
        let _c = hub.register(tx_c).await.unwrap();

        hub.subscribe(&a, "room:1").await.unwrap();
        hub.subscribe(&b, "room:1").await.unwrap();

        let delivered = hub.send_to_topic("room:1", "m").await;
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), "m");
        assert_eq!(rx_b.try_recv().unwrap(), "m");
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_topic_survives_closed_recipient() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        let a = hub.register(tx_a).await.unwrap();
        let b = hub.register(tx_b).await.unwrap();
        hub.subscribe(&a, "t").await.unwrap();
        hub.subscribe(&b, "t").await.unwrap();

        // A's receiver is gone; delivery to B must still happen.
        drop(rx_a);
        let delivered = hub.send_to_topic("t", "m").await;
        assert_eq!(delivered, 1);
        assert_eq!(rx_b.try_recv().unwrap(), "m");
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();

        let a = hub.register(tx_a).await.unwrap();
        let _b = hub.register(tx_b).await.unwrap();
        let _c = hub.register(tx_c).await.unwrap();

        let delivered = hub.broadcast(&a, "hello").await;
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
        assert_eq!(rx_c.try_recv().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_broadcast_with_single_connection_delivers_nothing() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        assert_eq!(hub.broadcast(&id, "hello").await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection_is_silent() {
        let hub = RelayHub::new(HubConfig::default());
        // Must not panic or error.
        hub.send_to_connection("nonexistent", "m").await;
    }

    #[tokio::test]
    async fn test_close_all_clears_tables() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = hub.register(tx_a).await.unwrap();
        let _b = hub.register(tx_b).await.unwrap();
        hub.subscribe(&a, "room:1").await.unwrap();

        // One receiver already dropped; close_all must still clear everything.
        drop(rx_b);
        hub.close_all().await;

        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.topic_subscriber_count("room:1").await, 0);
    }

    #[tokio::test]
    async fn test_unregister_cleans_topic_index() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        hub.subscribe(&id, "room:1").await.unwrap();
        hub.subscribe(&id, "room:2").await.unwrap();
        hub.unregister(&id).await;

        assert_eq!(hub.topic_subscriber_count("room:1").await, 0);
        assert_eq!(hub.topic_subscriber_count("room:2").await, 0);
    }
}
