//! WebSocket push channel. Observers attach, receive a `server:ack`, get a
//! replay of buffered stage events, then every live event as it is
//! published. Inbound frames (including `client:ack`) only refresh the
//! registry's activity timestamp; a silent client is never detached.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use ulid::Ulid;

use lens_events::StageEvent;

use crate::AppState;

#[derive(Debug, Clone, Copy)]
pub struct SocketEntry {
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Diagnostic roster of attached observers.
#[derive(Clone, Default)]
pub struct SocketRegistry {
    inner: Arc<Mutex<HashMap<String, SocketEntry>>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, socket_id: &str) {
        let now = Utc::now();
        self.inner.lock().await.insert(
            socket_id.to_string(),
            SocketEntry {
                connected_at: now,
                last_activity: now,
            },
        );
    }

    pub async fn touch(&self, socket_id: &str) {
        if let Some(entry) = self.inner.lock().await.get_mut(socket_id) {
            entry.last_activity = Utc::now();
        }
    }

    pub async fn detach(&self, socket_id: &str) {
        self.inner.lock().await.remove(socket_id);
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn entry(&self, socket_id: &str) -> Option<SocketEntry> {
        self.inner.lock().await.get(socket_id).copied()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events/ws", get(ws_handler))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/events/ws",
    responses((status = 101, description = "WebSocket upgrade"))
)]
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(stream: WebSocket, state: AppState) {
    let socket_id = format!("socket_{}", Ulid::new());
    state.sockets.attach(&socket_id).await;
    tracing::debug!(%socket_id, "observer attached");

    // Subscribe before replaying so nothing published in between is lost; a
    // brief overlap can duplicate an event, which observers tolerate.
    let mut live = BroadcastStream::new(state.event_bus.subscribe());
    let (mut sender, mut receiver) = stream.split();

    let ack = frame(
        "server:ack",
        json!({ "socketId": socket_id, "message": "connected" }),
    );
    if sender.send(ack).await.is_err() {
        state.sockets.detach(&socket_id).await;
        return;
    }

    for event in state.event_bus.replay() {
        if sender.send(event_frame(&event)).await.is_err() {
            state.sockets.detach(&socket_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            outbound = live.next() => match outbound {
                Some(Ok(event)) => {
                    if sender.send(event_frame(&event)).await.is_err() {
                        break;
                    }
                }
                // Lagged behind the broadcast buffer; the polling endpoint
                // covers whatever was skipped.
                Some(Err(_)) => continue,
                None => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => state.sockets.touch(&socket_id).await,
            },
        }
    }

    state.sockets.detach(&socket_id).await;
    tracing::debug!(%socket_id, "observer detached");
}

fn event_frame(event: &StageEvent) -> Message {
    let data = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    frame(event.status.event_name(), data)
}

fn frame(event: &str, data: Value) -> Message {
    let body = json!({ "event": event, "data": data }).to_string();
    Message::Text(Utf8Bytes::from(body))
}
