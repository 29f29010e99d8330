//! Connection handlers for the Agora server.
//!
//! This module accepts WebSocket upgrades and hands each connection to the
//! manager and its two pumps.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use agora_core::{
    display_name, read_pump, write_pump, ClientHandle, Manager, ManagerConfig, ManagerHandle,
};
use agora_transport::{websocket, ConnectionId};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    /// Handle to the connection manager.
    pub manager: ManagerHandle,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, manager: ManagerHandle) -> Self {
        Self { manager, config }
    }
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Requested display name.
    pub username: Option<String>,
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let (manager, _manager_task) = Manager::spawn(ManagerConfig {
        event_capacity: config.limits.event_queue_capacity,
    });
    let state = Arc::new(AppState::new(config.clone(), manager));

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Agora server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();

    Router::new()
        .route(&ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.manager.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "clients": stats.clients,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        ),
    }
}

/// WebSocket upgrade handler.
///
/// Any `Origin` is accepted.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let name = display_name(
        params.username.as_deref(),
        &state.config.chat.default_username,
    );

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, name, state))
}

/// Handle a WebSocket connection.
///
/// The upgrade task itself runs the read pump; the write pump gets its own
/// task.
async fn handle_websocket(socket: WebSocket, name: String, state: Arc<AppState>) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let id = ConnectionId::generate();
    let (client, queue) = ClientHandle::open(
        id.clone(),
        name.clone(),
        state.config.limits.outbound_queue_capacity,
    );

    if let Err(e) = state.manager.connect(client).await {
        error!(client = %id, error = %e, "Failed to register client");
        return;
    }
    debug!(client = %id, name = %name, "WebSocket connected");

    let (reader, writer) = websocket::split(socket);
    tokio::spawn(write_pump(writer, queue, id.clone()));
    read_pump(reader, id.clone(), name, state.manager.clone()).await;

    debug!(client = %id, "WebSocket disconnected");
}
