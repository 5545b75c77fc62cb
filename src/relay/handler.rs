//! Relay Connection Handler
//!
//! Accepts WebSocket upgrades, runs one receive loop per connection, and
//! routes inbound text frames through the control protocol. Malformed input
//! produces an error acknowledgement; it never closes the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::RelayHub;
use super::messages::{Ack, ControlMessage, ForwardedMessage, HEARTBEAT, HEARTBEAT_ACK};
use crate::api::AppState;

/// WebSocket upgrade handler: entry point for relay clients connecting to
/// `/ws`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Run one accepted connection to completion.
///
/// Registration happens first; the cleanup path unregisters the connection
/// on every exit (close frame, read error, or cancellation via the send
/// task ending).
async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let connection_id = match hub.register(tx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting relay connection");
            let _ = sender
                .send(Message::Text(Ack::error(e.to_string()).to_json()))
                .await;
            return;
        }
    };

    let conn_id_for_send = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "relay send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(message) => {
                    if !handle_ws_message(&hub_for_recv, &conn_id_for_recv, message).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "relay receive error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    hub.unregister(&connection_id).await;
}

/// Handle one received WebSocket message.
///
/// Returns false if the connection should be closed.
async fn handle_ws_message(hub: &RelayHub, connection_id: &str, message: Message) -> bool {
    match message {
        Message::Text(text) => {
            route_text(hub, connection_id, &text).await;
            true
        }
        Message::Binary(_) => {
            hub.send_to_connection(
                connection_id,
                &Ack::error("binary messages not supported").to_json(),
            )
            .await;
            true
        }
        // Axum answers pings automatically.
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "relay client requested close");
            false
        }
    }
}

/// Route one inbound text frame, in priority order: keepalive, JSON control
/// envelope, then legacy broadcast for everything else.
async fn route_text(hub: &RelayHub, connection_id: &str, text: &str) {
    if text == HEARTBEAT {
        hub.send_to_connection(connection_id, HEARTBEAT_ACK).await;
        return;
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(value) => {
                if value.get("type").is_none() {
                    // Bare JSON without a control envelope: callers predating
                    // the control protocol expect a broadcast.
                    legacy_broadcast(hub, connection_id, text).await;
                    return;
                }
                match serde_json::from_value::<ControlMessage>(value) {
                    Ok(control) => handle_control(hub, connection_id, control).await,
                    Err(e) => {
                        tracing::debug!(
                            connection_id = %connection_id,
                            error = %e,
                            "unknown control message"
                        );
                        hub.send_to_connection(
                            connection_id,
                            &Ack::error("unknown message type").to_json(),
                        )
                        .await;
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "malformed json from relay client"
                );
                hub.send_to_connection(
                    connection_id,
                    &Ack::error("invalid message format").to_json(),
                )
                .await;
            }
        }
    } else {
        legacy_broadcast(hub, connection_id, text).await;
    }
}

/// Dispatch a parsed control message.
async fn handle_control(hub: &RelayHub, connection_id: &str, control: ControlMessage) {
    match control {
        ControlMessage::Subscribe { topic } => {
            match hub.subscribe(connection_id, &topic).await {
                Ok(_) => {
                    hub.send_to_connection(
                        connection_id,
                        &Ack::success(format!("subscribed to {topic}")).to_json(),
                    )
                    .await;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "subscribe failed");
                }
            }
        }
        ControlMessage::Unsubscribe { topic } => {
            match hub.unsubscribe(connection_id, &topic).await {
                Ok(_) => {
                    hub.send_to_connection(
                        connection_id,
                        &Ack::success(format!("unsubscribed from {topic}")).to_json(),
                    )
                    .await;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "unsubscribe failed");
                }
            }
        }
        ControlMessage::Direct { target_id, content } => {
            let wrapped = ForwardedMessage::Direct {
                from: connection_id.to_string(),
                content,
            };
            hub.send_to_connection(&target_id, &wrapped.to_json()).await;

            // The sender is acknowledged whether or not the target exists.
            hub.send_to_connection(
                connection_id,
                &Ack::success(format!("message sent to {target_id}")).to_json(),
            )
            .await;
        }
        ControlMessage::Topic { topic, content } => {
            let wrapped = ForwardedMessage::Topic {
                from: connection_id.to_string(),
                topic: topic.clone(),
                content,
            };
            let delivered = hub.send_to_topic(&topic, &wrapped.to_json()).await;

            hub.send_to_connection(
                connection_id,
                &Ack::success(format!("sent to {delivered} subscribers of {topic}")).to_json(),
            )
            .await;
        }
    }
}

/// Forward raw text, tagged with the sender id, to every other connection.
async fn legacy_broadcast(hub: &RelayHub, connection_id: &str, text: &str) {
    let tagged = format!("[{connection_id}]: {text}");
    hub.broadcast(connection_id, &tagged).await;
}
