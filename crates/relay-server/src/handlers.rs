//! HTTP and WebSocket handlers for the Relay server.
//!
//! This module wires the hub, the router and the metrics recorder together
//! and exposes them over axum.

use crate::config::{Config, CorsConfig};
use crate::metrics::{self, MetricsRecorder};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use relay_core::identity::is_valid_user_id;
use relay_core::{Router as RelayRouter, RouterError};
use relay_protocol::SocketEvent;
use relay_transport::{Transport, TransportError, WebSocketHub};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The message router.
    pub router: Arc<RelayRouter>,
    /// The WebSocket hub feeding the router.
    pub hub: Arc<WebSocketHub>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state with the router and metrics subscribed to the hub.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let router = Arc::new(RelayRouter::with_config(config.router_config()));
        let hub = Arc::new(WebSocketHub::new(config.hub_config()));

        hub.subscribe(router.clone());
        hub.subscribe(Arc::new(MetricsRecorder));

        Self {
            router,
            hub,
            config,
        }
    }
}

/// Errors returned by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Identity is not connected.
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// User is not a member of the room.
    #[error("{user} is not a member of {room}")]
    NotMember { room: String, user: String },

    /// Request was malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The connection could not be written to.
    #[error("Delivery failed: {0}")]
    Delivery(TransportError),
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::UnknownIdentity(user) => Self::UnknownUser(user),
            RouterError::Transport(e) => Self::Delivery(e),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UnknownUser(_) | Self::NotMember { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Delivery(_) => StatusCode::BAD_GATEWAY,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/rooms/:room", get(room_handler))
        .route(
            "/rooms/:room/members/:user",
            put(join_handler).delete(leave_handler),
        )
        .route("/users/:user/events", post(emit_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer. `*` allows every origin.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allow_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Run the HTTP/WebSocket server until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = app(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Relay server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

/// WebSocket upgrade handler.
///
/// Plain HTTP requests are rejected by the extractor with 426 Upgrade Required.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| hub.serve(socket))
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "transport": state.hub.name(),
        "connections": state.hub.connection_count(),
        "router": state.router.stats(),
    }))
}

#[derive(Debug, Serialize)]
struct RoomResponse {
    room: String,
    members: Vec<String>,
}

/// List the members of a room.
async fn room_handler(
    Path(room): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<RoomResponse> {
    let members = state.router.room_members(&room);
    Json(RoomResponse { room, members })
}

/// Add a connected user to a room.
async fn join_handler(
    Path((room, user)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_valid_user_id(&user) {
        return Err(ApiError::BadRequest(format!("Malformed user id: {user}")));
    }

    let joined = state.router.join_room(&room, &user)?;
    info!(room = %room, user = %user, joined, "Room join");

    let status = if joined {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RoomResponse {
        members: state.router.room_members(&room),
        room,
    })))
}

/// Remove a user from a room.
async fn leave_handler(
    Path((room, user)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if state.router.leave_room(&room, &user) {
        info!(room = %room, user = %user, "Room leave");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotMember { room, user })
    }
}

/// Push a server event to one connected user.
async fn emit_handler(
    Path(user): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(event): Json<SocketEvent>,
) -> Result<StatusCode, ApiError> {
    state
        .router
        .emit(state.hub.as_ref(), &user, &event)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
