//! Background sync of notes captured while offline.

pub mod queue;
pub mod sqlite;

use crate::network::{FetchRequest, Network};
use crate::proxy::AppState;
use crate::router::origin_uri;
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use bytes::Bytes;
use queue::{NoteQueue, QueueError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Replay every pending note to the capture endpoint, serially, oldest first.
///
/// A note is removed only after the endpoint accepts it. A failed note is
/// logged and stays queued; the rest of the batch still runs.
pub async fn sync_offline_notes(
    queue: &dyn NoteQueue,
    network: &dyn Network,
    capture_uri: &Uri,
) -> Result<SyncReport, QueueError> {
    let pending = queue.list_pending().await?;
    let mut report = SyncReport {
        attempted: pending.len(),
        ..Default::default()
    };

    for note in pending {
        let body = match serde_json::to_vec(&note.payload) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::error!(note = %note.id, error = %e, "failed to encode note");
                report.failed += 1;
                continue;
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let request = FetchRequest {
            method: Method::POST,
            uri: capture_uri.clone(),
            headers,
            body,
        };

        match network.fetch(request).await {
            Ok(resp) if resp.status.is_success() => {
                if let Err(e) = queue.remove(&note.id).await {
                    tracing::error!(note = %note.id, error = %e, "synced note could not be dequeued");
                    report.failed += 1;
                    continue;
                }
                tracing::debug!(note = %note.id, "note synced");
                report.synced += 1;
            }
            Ok(resp) => {
                tracing::error!(note = %note.id, status = resp.status.as_u16(), "capture endpoint rejected note");
                report.failed += 1;
            }
            Err(e) => {
                tracing::error!(note = %note.id, error = %e, "failed to sync note");
                report.failed += 1;
            }
        }
    }

    metrics::counter!("agent_notes_synced_total").increment(report.synced as u64);
    metrics::counter!("agent_notes_failed_total").increment(report.failed as u64);
    Ok(report)
}

/// Handle a sync event. Only the configured note-sync tag does anything;
/// other tags return `None`. Overlapping runs are serialized.
pub async fn handle_sync_event(state: &AppState, tag: &str) -> Result<Option<SyncReport>, QueueError> {
    let config = state.config.load_full();
    if tag != config.sync.tag {
        tracing::debug!(tag = %tag, "ignoring unknown sync tag");
        return Ok(None);
    }

    let _running = state.sync_lock.lock().await;
    let capture_uri = origin_uri(&state.origin, &config.sync.capture_path);
    let report = sync_offline_notes(state.queue.as_ref(), state.network.as_ref(), &capture_uri).await?;
    if report.attempted > 0 {
        tracing::info!(
            tag = %tag,
            attempted = report.attempted,
            synced = report.synced,
            failed = report.failed,
            "sync finished"
        );
    }
    Ok(Some(report))
}

/// How often a disabled timer looks for a reloaded interval.
const DISABLED_POLL: Duration = Duration::from_secs(5);

/// Fire the note-sync event on a timer until shutdown.
///
/// The interval is read from the live config before every wait, so a
/// reload that changes it (or enables the timer from 0) applies on the next
/// tick.
pub async fn run_sync_timer(state: Arc<AppState>, shutdown: CancellationToken) {
    let mut current = None;

    loop {
        let seconds = state.config.load().sync.interval_seconds;
        if current != Some(seconds) {
            if seconds == 0 {
                tracing::info!("sync timer disabled");
            } else {
                tracing::info!(interval_seconds = seconds, "sync timer armed");
            }
            current = Some(seconds);
        }
        let wait = if seconds == 0 {
            DISABLED_POLL
        } else {
            Duration::from_secs(seconds)
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("sync timer shutting down");
                break;
            }
            _ = tokio::time::sleep(wait) => {
                let config = state.config.load_full();
                if config.sync.interval_seconds == 0 || !state.lifecycle.is_active() {
                    continue;
                }
                if let Err(e) = handle_sync_event(&state, &config.sync.tag).await {
                    tracing::error!(error = %e, "sync run failed");
                }
            }
        }
    }
}
