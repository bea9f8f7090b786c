use crate::error::AgentError;
use crate::proxy::AppState;
use crate::push::{NotificationEvent, PushPayload};
use crate::sync::handle_sync_event;
use crate::sync::queue::{NoteQueue, OfflineNote};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// GET /api/stats: one-shot snapshot of lifecycle, caches and queue.
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AgentError> {
    let config = state.config.load_full();
    let stats = state
        .storage
        .get(&config.cache.name)
        .map(|c| c.stats())
        .unwrap_or_default();
    let pending = state.queue.list_pending().await?.len();

    Ok(Json(serde_json::json!({
        "lifecycle": state.lifecycle.state(),
        "cache": {
            "name": config.cache.name,
            "entries": stats.current_size,
            "hits": stats.hits,
            "misses": stats.misses,
            "inserts": stats.inserts,
        },
        "caches": state.storage.keys(),
        "pending_notes": pending,
        "notifications": state.notifications.active().len(),
    })))
}

/// POST /api/sync/{tag}: fire a sync event.
pub async fn sync_handler(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse, AgentError> {
    match handle_sync_event(&state, &tag).await? {
        Some(report) => Ok((StatusCode::OK, Json(serde_json::json!(report)))),
        None => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "ignored": tag })),
        )),
    }
}

/// Body of POST /api/notes. `id` is generated when absent.
#[derive(Deserialize)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub payload: serde_json::Value,
}

/// POST /api/notes: queue a note captured while offline.
pub async fn enqueue_note_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnqueueRequest>,
) -> Result<impl IntoResponse, AgentError> {
    if !body.payload.is_object() {
        return Err(AgentError::BadRequest("payload must be a JSON object".into()));
    }

    let mut note = OfflineNote::new(body.payload);
    if let Some(id) = body.id {
        note.id = id;
    }
    state.queue.enqueue(note.clone()).await?;
    tracing::info!(note = %note.id, "offline note queued");

    Ok((StatusCode::CREATED, Json(note)))
}

/// GET /api/notes: pending notes, oldest first.
pub async fn list_notes_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AgentError> {
    Ok(Json(state.queue.list_pending().await?))
}

/// POST /api/push: deliver a push message.
pub async fn push_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PushPayload>,
) -> impl IntoResponse {
    let notification = state.notifications.show(payload);
    (StatusCode::CREATED, Json(notification))
}

/// POST /api/notifications/{tag}/click
pub async fn click_handler(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse, AgentError> {
    let url = state
        .notifications
        .click(&tag)
        .ok_or_else(|| AgentError::NotFound(format!("no notification tagged `{tag}`")))?;
    Ok(Json(serde_json::json!({ "open": url })))
}

/// WebSocket upgrade handler for /ws/notifications.
pub async fn ws_notifications_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.notifications.subscribe();
    ws.on_upgrade(move |socket| handle_ws_client(socket, rx))
}

async fn handle_ws_client(mut socket: WebSocket, mut rx: broadcast::Receiver<NotificationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break; // Client disconnected
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
