//! Axum route handlers for the agent-worlds server.
//!
//! # Routes
//!
//! - `GET /health`           - Returns `{"status": "ok", "version": ...}`
//! - `GET /worlds`           - List world summaries
//! - `GET /worlds/:world`    - Materialize a world and return it with its agents
//! - `GET /worlds/:world/ws` - WebSocket subscription to a world's events
//!
//! Inbound websocket text frames are `{"content": "...", "sender": "..."?}`
//! and are published as human messages. Every bus event is forwarded to the
//! socket as JSON.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::WorldError;
use crate::events::{actions, SenderType, WorldEvent};
use crate::governance::governor::HUMAN_HANDLE;
use crate::subscription::{ChannelConnection, ClientConnection, Subscription, SubscriptionManager};
use crate::world::WorldManager;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<WorldManager>,
    pub subscriptions: SubscriptionManager,
}

impl AppState {
    pub fn new(manager: Arc<WorldManager>) -> Self {
        Self {
            subscriptions: SubscriptionManager::new(manager.clone()),
            manager,
        }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/worlds", get(list_worlds_handler))
        .route("/worlds/:world", get(get_world_handler))
        .route("/worlds/:world/ws", get(world_socket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(err: WorldError) -> ApiError {
    let status = match &err {
        WorldError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorldError::AlreadyExists { .. } => StatusCode::CONFLICT,
        WorldError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        WorldError::AlreadyClosed => StatusCode::GONE,
        WorldError::Storage(_) | WorldError::Llm(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, Json(json!({ "error": err.to_string() })))
}

/// GET /health - liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "agent-worlds",
    }))
}

/// GET /worlds - world summaries.
async fn list_worlds_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let worlds = state.manager.list_worlds().await.map_err(error_response)?;
    Ok(Json(json!({ "worlds": worlds })))
}

/// GET /worlds/:world - the world with its materialized agents.
async fn get_world_handler(
    State(state): State<AppState>,
    Path(world): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let live = state
        .manager
        .materialize_world(&world)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({
        "world": live.world(),
        "turnLimit": live.turn_limit(),
        "agents": live.agents(),
    })))
}

/// GET /worlds/:world/ws - upgrade and subscribe.
async fn world_socket_handler(
    State(state): State<AppState>,
    Path(world): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Resolve before upgrading so an unknown world is a plain 404.
    let world = state.manager.get_world(&world).await.map_err(error_response)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, world.id, state)))
}

// ---------------------------------------------------------------------------
// WebSocket session
// ---------------------------------------------------------------------------

/// Inbound chat frame.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    content: String,
    #[serde(default)]
    sender: Option<String>,
}

async fn handle_socket(socket: WebSocket, world_id: String, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (connection, mut outbound) = ChannelConnection::new();
    let connection = Arc::new(connection);

    let subscription = match state
        .subscriptions
        .subscribe(&world_id, connection.clone())
        .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(world_id = %world_id, error = %e, "websocket subscribe failed");
            let frame = error_frame(&e.to_string());
            let _ = sink.send(Message::Text(frame)).await;
            return;
        }
    };

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_inbound(&subscription, connection.as_ref(), &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(world_id = %world_id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    subscription.unsubscribe();
    writer.abort();
}

fn handle_inbound(subscription: &Subscription, connection: &dyn ClientConnection, text: &str) {
    let inbound: InboundMessage = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            let _ = connection.send(error_frame(&format!("invalid message frame: {}", e)));
            return;
        }
    };
    if inbound.content.trim().is_empty() {
        let _ = connection.send(error_frame("message content must not be empty"));
        return;
    }
    let sender = inbound
        .sender
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| HUMAN_HANDLE.to_string());
    // A human frame must not speak as one of the world's agents.
    if subscription.world().runtime(&sender).is_some() {
        let _ = connection.send(error_frame(&format!(
            "sender '{}' is reserved for an agent of this world",
            sender
        )));
        return;
    }
    subscription
        .world()
        .publish_message(inbound.content, sender, SenderType::Human);
}

fn error_frame(message: &str) -> String {
    WorldEvent::system(actions::ERROR, Some(json!({ "error": message })))
        .to_json()
        .unwrap_or_else(|_| json!({ "error": message }).to_string())
}
