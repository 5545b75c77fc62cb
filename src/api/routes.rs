//! API Route Handlers
//!
//! Room watch management and health, the non-WebSocket surface of the
//! relay.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use super::error::ApiResult;
use super::state::AppState;
use crate::orchestrator::{Orchestrator, RoomStatus};

/// Response for watch/unwatch operations
#[derive(Serialize)]
pub struct WatchResponse {
    pub room: String,
    pub topic: String,
}

/// `POST /api/v1/rooms/:id/watch` - start watching a room
pub async fn watch_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<(StatusCode, Json<WatchResponse>)> {
    state.orchestrator.watch_room(&room).await?;
    Ok((
        StatusCode::CREATED,
        Json(WatchResponse {
            topic: Orchestrator::room_topic(&room),
            room,
        }),
    ))
}

/// `DELETE /api/v1/rooms/:id/watch` - stop watching a room
pub async fn unwatch_room(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<WatchResponse>> {
    state.orchestrator.unwatch_room(&room).await?;
    Ok(Json(WatchResponse {
        topic: Orchestrator::room_topic(&room),
        room,
    }))
}

/// `GET /api/v1/rooms/:id/status` - live status from the platform
pub async fn room_status(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> ApiResult<Json<RoomStatus>> {
    let status = state.orchestrator.room_status(&room).await?;
    Ok(Json(status))
}

/// Health response body
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub watched_rooms: usize,
}

/// `GET /health` - liveness and a few gauges
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
        connections: state.hub.connection_count().await,
        watched_rooms: state.orchestrator.watched_count().await,
    })
}
