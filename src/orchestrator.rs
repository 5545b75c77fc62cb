//! Room Orchestrator
//!
//! The seam between the stream clients and the relay: one watched room is
//! one `LiveStreamClient` whose events are serialized and published to the
//! room's relay topic. A periodic reaper closes rooms nobody is subscribed
//! to anymore.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::relay::RelayHub;
use crate::signature::{self, Signer};
use crate::stream::{LiveStreamClient, StreamConfig, StreamError, StreamEvent};

/// Errors surfaced to callers asking to watch a room or query its status
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("room {0} is already being watched")]
    AlreadyWatched(String),

    #[error("room {0} is not being watched")]
    NotWatched(String),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("room status request failed: {0}")]
    StatusRequest(#[from] reqwest::Error),

    #[error("room status response did not contain room data")]
    MalformedStatus,
}

/// One actively watched room.
struct WatchedRoom {
    client: Arc<LiveStreamClient>,
    forward: JoinHandle<()>,
    started: Instant,
}

/// Wires stream clients to relay topics, one client per watched room.
pub struct Orchestrator {
    hub: Arc<RelayHub>,
    config: StreamConfig,
    signer: Arc<dyn Signer>,
    http: reqwest::Client,
    rooms: RwLock<HashMap<String, WatchedRoom>>,
    /// Session token shared across rooms; resolved once and reused.
    session_token: Mutex<Option<String>>,
}

impl Orchestrator {
    pub fn new(hub: Arc<RelayHub>, config: StreamConfig, signer: Arc<dyn Signer>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            hub,
            config,
            signer,
            http,
            rooms: RwLock::new(HashMap::new()),
            session_token: Mutex::new(None),
        }
    }

    /// Topic a room's events are published on.
    pub fn room_topic(short_id: &str) -> String {
        format!("room:{short_id}")
    }

    /// Number of rooms currently being watched.
    pub async fn watched_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Start watching a room: connect a stream client and forward its
    /// events to the room topic. Setup failures surface to the caller.
    pub async fn watch_room(&self, short_id: &str) -> Result<(), WatchError> {
        {
            let rooms = self.rooms.read().await;
            if rooms.contains_key(short_id) {
                return Err(WatchError::AlreadyWatched(short_id.to_string()));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(LiveStreamClient::new(
            short_id,
            self.config.clone(),
            Arc::clone(&self.signer),
            tx,
        ));

        if let Some(token) = self.session_token.lock().await.clone() {
            client.seed_session_token(token).await;
        }

        Arc::clone(&client).connect().await?;

        // Keep the resolved token for subsequent rooms.
        if let Some(token) = client.session_token().await {
            *self.session_token.lock().await = Some(token);
        }

        let forward = self.spawn_forwarder(short_id.to_string(), rx);

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(short_id) {
            // Lost the race to another watcher; tear this one down.
            forward.abort();
            client.close().await;
            return Err(WatchError::AlreadyWatched(short_id.to_string()));
        }
        rooms.insert(
            short_id.to_string(),
            WatchedRoom {
                client,
                forward,
                started: Instant::now(),
            },
        );

        tracing::info!(room = %short_id, "watching room");
        Ok(())
    }

    fn spawn_forwarder(
        &self,
        short_id: String,
        mut rx: mpsc::UnboundedReceiver<StreamEvent>,
    ) -> JoinHandle<()> {
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            let topic = Orchestrator::room_topic(&short_id);
            while let Some(event) = rx.recv().await {
                let json = serialize_event(&short_id, &event);
                hub.send_to_topic(&topic, &json).await;
            }
            tracing::debug!(room = %short_id, "event forwarder stopped");
        })
    }

    /// Stop watching a room and release its stream connection.
    pub async fn unwatch_room(&self, short_id: &str) -> Result<(), WatchError> {
        let removed = self.rooms.write().await.remove(short_id);
        match removed {
            Some(room) => {
                room.client.close().await;
                room.forward.abort();
                tracing::info!(room = %short_id, "stopped watching room");
                Ok(())
            }
            None => Err(WatchError::NotWatched(short_id.to_string())),
        }
    }

    /// Periodically close rooms with no remaining topic subscribers.
    ///
    /// Rooms younger than one interval are left alone so a watcher has time
    /// to subscribe after asking for the room.
    pub fn start_idle_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                orchestrator.reap_idle_rooms(interval).await;
            }
        })
    }

    async fn reap_idle_rooms(&self, grace: Duration) {
        let candidates: Vec<String> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .filter(|(_, room)| room.started.elapsed() >= grace)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for short_id in candidates {
            let topic = Orchestrator::room_topic(&short_id);
            if self.hub.topic_subscriber_count(&topic).await == 0 {
                tracing::info!(room = %short_id, "no subscribers left, closing room");
                if let Err(e) = self.unwatch_room(&short_id).await {
                    tracing::debug!(room = %short_id, error = %e, "idle reap skipped");
                }
            }
        }
    }

    /// Fetch the room's live status from the platform's room-enter API.
    pub async fn room_status(&self, short_id: &str) -> Result<RoomStatus, WatchError> {
        let token = self.ensure_session_token().await?;

        // The status API accepts the short id; the long id is optional and
        // only known for watched rooms.
        let api_url = format!(
            "{}webcast/room/web/enter/?aid=6383&web_rid={}",
            self.config.base_url, short_id
        );

        let response: RoomEnterResponse = self
            .http
            .get(&api_url)
            .header(reqwest::header::COOKIE, format!("ttwid={token}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let room = response
            .data
            .and_then(|d| d.room)
            .ok_or(WatchError::MalformedStatus)?;

        Ok(RoomStatus {
            live_id: short_id.to_string(),
            is_live: room.status == 2,
            title: room.title,
            anchor_name: room.owner.as_ref().map(|o| o.nickname.clone()),
            anchor_id: room.owner.and_then(|o| o.user_id),
            online_count: room.user_count,
            cover_url: room
                .cover
                .and_then(|c| c.url_list.into_iter().next()),
        })
    }

    async fn ensure_session_token(&self) -> Result<String, WatchError> {
        let mut cached = self.session_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = signature::fetch_session_token(&self.http, &self.config.base_url)
            .await
            .map_err(StreamError::from)?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Serialize one stream event to the JSON published on the room topic.
pub fn serialize_event(short_id: &str, event: &StreamEvent) -> String {
    let value = match event {
        StreamEvent::Chat(chat) => serde_json::json!({
            "kind": "chat",
            "room": short_id,
            "user": chat.user.as_ref().map(|u| u.nickname.clone()),
            "user_id": chat.user.as_ref().map(|u| u.id),
            "content": chat.content,
        }),
        StreamEvent::Gift(gift) => serde_json::json!({
            "kind": "gift",
            "room": short_id,
            "user": gift.user.as_ref().map(|u| u.nickname.clone()),
            "user_id": gift.user.as_ref().map(|u| u.id),
            "gift_id": gift.gift_id,
            "gift_name": gift.gift.as_ref().map(|g| g.name.clone()),
            "combo_count": gift.combo_count,
            "diamond_count": gift.gift.as_ref().map(|g| g.diamond_count),
        }),
    };
    value.to_string()
}

/// Live status of a room, mapped from the platform's status API
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub live_id: String,
    pub is_live: bool,
    pub title: Option<String>,
    pub anchor_name: Option<String>,
    pub anchor_id: Option<String>,
    pub online_count: Option<u64>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoomEnterResponse {
    data: Option<RoomEnterData>,
}

#[derive(Debug, Deserialize)]
struct RoomEnterData {
    room: Option<RoomInfo>,
}

#[derive(Debug, Deserialize)]
struct RoomInfo {
    #[serde(default)]
    status: i64,
    title: Option<String>,
    owner: Option<AnchorInfo>,
    user_count: Option<u64>,
    cover: Option<CoverInfo>,
}

#[derive(Debug, Deserialize)]
struct AnchorInfo {
    #[serde(default)]
    nickname: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoverInfo {
    #[serde(default)]
    url_list: Vec<String>,
}
