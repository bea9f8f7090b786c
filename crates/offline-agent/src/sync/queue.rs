use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::rusqlite;

/// A note captured while offline, waiting to be replayed to the capture endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineNote {
    pub id: String,
    /// The JSON body the page would have POSTed.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OfflineNote {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("note queue database error: {0}")]
    Database(tokio_rusqlite::Error),

    #[error("note queue migration failed: {0}")]
    MigrationFailed(String),

    #[error("invalid note payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("corrupt note row: {0}")]
    Corrupt(String),
}

impl From<tokio_rusqlite::Error<QueueError>> for QueueError {
    fn from(err: tokio_rusqlite::Error<QueueError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => {
                QueueError::Database(tokio_rusqlite::Error::ConnectionClosed)
            }
            tokio_rusqlite::Error::Close(c) => QueueError::Database(tokio_rusqlite::Error::Close(c)),
            _ => QueueError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for QueueError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        QueueError::Database(err)
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(err: rusqlite::Error) -> Self {
        QueueError::Database(tokio_rusqlite::Error::Error(err))
    }
}

/// Durable FIFO of notes awaiting sync.
#[async_trait]
pub trait NoteQueue: Send + Sync {
    /// Add a note. Re-enqueueing an existing id replaces its payload and keeps its position.
    async fn enqueue(&self, note: OfflineNote) -> Result<(), QueueError>;

    /// Pending notes, oldest first.
    async fn list_pending(&self) -> Result<Vec<OfflineNote>, QueueError>;

    /// Remove a note once delivered. Returns whether it was queued.
    async fn remove(&self, id: &str) -> Result<bool, QueueError>;
}
