//! Stream Connection Client
//!
//! One `LiveStreamClient` per watched room. The client owns the socket
//! exclusively: the receive loop holds the read half, the write half sits
//! behind a mutex shared only with the heartbeat loop and `close`.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use prost::Message as _;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::protocol::{self, ChatMessage, GiftMessage, CHAT_METHOD, GIFT_METHOD};
use crate::signature::{self, Signer};

use super::session::RoomSession;
use super::{StreamConfig, StreamError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Fixed binary keepalive sent to the remote stream while connected.
const HEARTBEAT_PAYLOAD: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Typed events decoded from the stream, emitted in receive order.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chat(ChatMessage),
    Gift(GiftMessage),
}

/// Client for one room's stream connection.
///
/// Events are published on the channel handed to [`LiveStreamClient::new`];
/// the consumer drains them at its own pace. Delivery is at-most-once per
/// received sub-message, in receive order.
pub struct LiveStreamClient {
    room: String,
    config: StreamConfig,
    http: reqwest::Client,
    signer: Arc<dyn Signer>,
    session: Mutex<RoomSession>,
    state: Mutex<ConnectionState>,
    sink: Mutex<Option<WsSink>>,
    cancel: Mutex<CancellationToken>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl LiveStreamClient {
    pub fn new(
        room: impl Into<String>,
        config: StreamConfig,
        signer: Arc<dyn Signer>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        let room = room.into();
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            session: Mutex::new(RoomSession::new(room.clone())),
            room,
            config,
            http,
            signer,
            state: Mutex::new(ConnectionState::Disconnected),
            sink: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            events,
        }
    }

    /// Short room id this client watches.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Current connection state (a recent snapshot).
    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Seed a session token obtained elsewhere, avoiding a refetch.
    pub async fn seed_session_token(&self, token: String) {
        self.session.lock().await.set_session_token(token);
    }

    /// The cached session token, if resolved.
    pub async fn session_token(&self) -> Option<String> {
        self.session.lock().await.session_token().map(str::to_string)
    }

    /// Open the stream connection and start the receive and heartbeat
    /// loops.
    ///
    /// Fails with [`StreamError::AlreadyConnected`] unless currently
    /// disconnected. Any setup failure transitions back to disconnected and
    /// surfaces to the caller.
    pub async fn connect(self: Arc<Self>) -> Result<(), StreamError> {
        self.begin_connect().await?;

        match Arc::clone(&self).establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.lock().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Guard the `Disconnected -> Connecting` transition.
    async fn begin_connect(&self) -> Result<(), StreamError> {
        let mut state = self.state.lock().await;
        if *state != ConnectionState::Disconnected {
            return Err(StreamError::AlreadyConnected);
        }
        *state = ConnectionState::Connecting;
        Ok(())
    }

    async fn establish(self: Arc<Self>) -> Result<(), StreamError> {
        let (token, room_id) = {
            let mut session = self.session.lock().await;
            let token = session.ensure_session_token(&self.http, &self.config).await?;
            let room_id = session.ensure_room_id(&self.http, &self.config).await?;
            (token, room_id)
        };

        let url = self.build_stream_url(&room_id).await?;

        let mut request = url
            .into_client_request()
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Cookie",
            format!("ttwid={token}")
                .parse()
                .map_err(|_| StreamError::ConnectionFailed("invalid cookie header".to_string()))?,
        );
        headers.insert(
            "User-Agent",
            self.config
                .user_agent
                .parse()
                .map_err(|_| StreamError::ConnectionFailed("invalid user agent".to_string()))?,
        );

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
        let (sink, source) = ws.split();

        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();
        *self.sink.lock().await = Some(sink);
        *self.state.lock().await = ConnectionState::Connected;

        tracing::info!(room = %self.room, room_id = %room_id, "stream connected");

        let client = Arc::clone(&self);
        let recv_cancel = cancel.clone();
        tokio::spawn(async move { client.receive_loop(source, recv_cancel).await });

        let client = Arc::clone(&self);
        tokio::spawn(async move { client.heartbeat_loop(cancel).await });

        Ok(())
    }

    /// Build the signed connection URL for the resolved long room id.
    ///
    /// The signer may block on a child process, so the signing step runs
    /// through [`signature::sign_with_timeout`] rather than inline.
    async fn build_stream_url(&self, room_id: &str) -> Result<String, StreamError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let unsigned = format!(
            "{}?room_id={}&aid=6383&version_code=190500&webcast_sdk_version=1.3.0\
             &live_id=1&device_platform=web&device_type=windows&ac=wifi\
             &identity=audience&timestamp={}&sign=",
            self.config.ws_endpoint, room_id, timestamp
        );
        let sign = signature::sign_with_timeout(
            unsigned.clone(),
            Arc::clone(&self.signer),
            self.config.sign_timeout,
        )
        .await?;
        Ok(format!("{unsigned}{sign}"))
    }

    /// Read frames until the remote closes, the token cancels, or a read
    /// error hands control to the reconnect supervisor. Decode failures are
    /// scoped to the single frame.
    async fn receive_loop(self: Arc<Self>, mut source: WsSource, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return,
                message = source.next() => message,
            };

            match message {
                Some(Ok(Message::Binary(frame))) => self.handle_frame(&frame),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(room = %self.room, "stream closed by remote");
                    self.teardown().await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(room = %self.room, error = %e, "stream read failed");
                    self.teardown().await;
                    self.spawn_reconnect();
                    return;
                }
            }
        }
    }

    /// Decode one frame and emit events for recognized sub-messages.
    fn handle_frame(&self, frame: &[u8]) {
        let submessages = match protocol::decode_frame(frame) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(room = %self.room, error = %e, "dropping undecodable frame");
                return;
            }
        };

        for sub in submessages {
            match sub.method.as_str() {
                CHAT_METHOD => match ChatMessage::decode(sub.payload.as_slice()) {
                    Ok(chat) => self.emit(StreamEvent::Chat(chat)),
                    Err(e) => {
                        tracing::warn!(room = %self.room, error = %e, "malformed chat payload")
                    }
                },
                GIFT_METHOD => match GiftMessage::decode(sub.payload.as_slice()) {
                    Ok(gift) => self.emit(StreamEvent::Gift(gift)),
                    Err(e) => {
                        tracing::warn!(room = %self.room, error = %e, "malformed gift payload")
                    }
                },
                other => {
                    tracing::debug!(room = %self.room, method = %other, "ignoring sub-message")
                }
            }
        }
    }

    fn emit(&self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(room = %self.room, "event receiver dropped");
        }
    }

    /// Send the fixed keepalive at the configured cadence while connected.
    /// A send failure is logged and the loop continues; a broken socket
    /// surfaces in the receive loop, which owns reconnection.
    async fn heartbeat_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if self.state().await != ConnectionState::Connected {
                return;
            }

            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => {
                    if let Err(e) = sink.send(Message::Binary(HEARTBEAT_PAYLOAD.to_vec())).await {
                        tracing::warn!(room = %self.room, error = %e, "heartbeat send failed");
                    }
                }
                None => return,
            }
        }
    }

    /// Discard the current socket and return to disconnected. Safe to call
    /// from any state.
    async fn teardown(&self) {
        self.cancel.lock().await.cancel();
        self.sink.lock().await.take();
        *self.state.lock().await = ConnectionState::Disconnected;
    }

    /// Retry `connect` under the configured backoff policy until it
    /// succeeds or attempts run out.
    fn spawn_reconnect(self: &Arc<Self>) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let policy = client.config.reconnect.clone();
            for attempt in 0..policy.max_attempts {
                tokio::time::sleep(policy.delay_for(attempt)).await;

                match Arc::clone(&client).connect().await {
                    Ok(()) => {
                        tracing::info!(room = %client.room, attempt, "stream reconnected");
                        return;
                    }
                    Err(StreamError::AlreadyConnected) => return,
                    Err(e) => {
                        tracing::warn!(
                            room = %client.room,
                            attempt,
                            error = %e,
                            "reconnect attempt failed"
                        );
                    }
                }
            }
            tracing::error!(
                room = %client.room,
                attempts = policy.max_attempts,
                "giving up on stream reconnection"
            );
        });
    }

    /// Close the connection. Idempotent: a no-op unless currently
    /// connected. The close frame is best-effort; both loops observe the
    /// cancellation token and exit.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            if *state != ConnectionState::Connected {
                return;
            }
            *state = ConnectionState::Closing;
        }

        self.cancel.lock().await.cancel();

        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                tracing::debug!(room = %self.room, error = %e, "close frame send failed");
            }
        }

        *self.state.lock().await = ConnectionState::Disconnected;
        tracing::info!(room = %self.room, "stream closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Envelope, StreamUser, SubMessage};
    use crate::signature::FnSigner;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn stub_signer() -> Arc<dyn Signer> {
        Arc::new(FnSigner(|_: &str| Ok("stub-signature".to_string())))
    }

    fn test_client() -> (Arc<LiveStreamClient>, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(LiveStreamClient::new(
            "78888888",
            StreamConfig::default(),
            stub_signer(),
            tx,
        ));
        (client, rx)
    }

    fn compress(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_second_connect_fails_while_connecting() {
        let (client, _rx) = test_client();

        client.begin_connect().await.unwrap();
        let result = client.begin_connect().await;
        assert!(matches!(result, Err(StreamError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn test_close_when_disconnected_is_noop() {
        let (client, _rx) = test_client();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        client.close().await;
        client.close().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_resets_to_disconnected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = StreamConfig {
            // Nothing listens here; session token resolution fails fast.
            base_url: "http://127.0.0.1:9/".to_string(),
            ..StreamConfig::default()
        };
        let client = Arc::new(LiveStreamClient::new("1", config, stub_signer(), tx));

        let result = Arc::clone(&client).connect().await;
        assert!(result.is_err());
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        // The failed attempt must not leave the state machine wedged.
        assert!(client.begin_connect().await.is_ok());
    }

    #[tokio::test]
    async fn test_build_stream_url_is_signed() {
        let (client, _rx) = test_client();
        let url = client.build_stream_url("7381929301").await.unwrap();

        assert!(url.starts_with(&client.config.ws_endpoint));
        assert!(url.contains("room_id=7381929301"));
        assert!(url.contains("aid=6383"));
        assert!(url.contains("identity=audience"));
        assert!(url.ends_with("sign=stub-signature"));
    }

    #[tokio::test]
    async fn test_handle_frame_emits_recognized_events_in_order() {
        let (client, mut rx) = test_client();

        let chat = ChatMessage {
            header: None,
            user: Some(StreamUser {
                id: 1,
                nickname: "alice".to_string(),
            }),
            content: "hi".to_string(),
        };
        let gift = GiftMessage {
            header: None,
            gift_id: 9,
            combo_count: 1,
            user: None,
            gift: None,
        };

        let envelope = Envelope {
            messages: vec![
                SubMessage {
                    method: CHAT_METHOD.to_string(),
                    payload: chat.encode_to_vec(),
                },
                SubMessage {
                    method: "WebcastLikeMessage".to_string(),
                    payload: vec![1, 2, 3],
                },
                SubMessage {
                    method: GIFT_METHOD.to_string(),
                    payload: gift.encode_to_vec(),
                },
            ],
        };

        client.handle_frame(&compress(&envelope.encode_to_vec()));

        match rx.try_recv().unwrap() {
            StreamEvent::Chat(c) => assert_eq!(c.content, "hi"),
            other => panic!("expected chat, got {other:?}"),
        }
        match rx.try_recv().unwrap() {
            StreamEvent::Gift(g) => assert_eq!(g.gift_id, 9),
            other => panic!("expected gift, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handle_frame_ignores_undecodable_input() {
        let (client, mut rx) = test_client();
        client.handle_frame(b"garbage");
        assert!(rx.try_recv().is_err());
    }
}
