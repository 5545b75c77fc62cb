//! Relay HTTP API
//!
//! HTTP surface for the relay, built with Axum.
//!
//! # Endpoints
//!
//! ## Rooms
//! - `POST /api/v1/rooms/:id/watch` - Start watching a room
//! - `DELETE /api/v1/rooms/:id/watch` - Stop watching a room
//! - `GET /api/v1/rooms/:id/status` - Fetch the room's live status
//!
//! ## Health
//! - `GET /health` - Liveness and basic gauges
//!
//! ## WebSocket
//! - `GET /ws` - Relay client connection
//!
//! # Example
//!
//! ```rust,ignore
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
//!     let state = AppState::new(hub, orchestrator, ApiConfig::default());
//!     serve(state).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::relay::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/rooms/:id/watch", post(routes::watch_room))
        .route("/rooms/:id/watch", delete(routes::unwatch_room))
        .route("/rooms/:id/status", get(routes::room_status));

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(routes::health))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server
pub async fn serve(state: AppState) -> Result<(), ApiError> {
    // A fresh process has no live peers; drop anything a previous
    // incarnation left in shared state before accepting connections.
    state.hub.close_all().await;

    let addr = state.config.addr();
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Relay shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
