use crate::network::NetworkError;
use crate::sync::queue::QueueError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Body of the terminal failure when neither network, cache nor offline page can answer.
pub const NO_CACHED_VERSION: &str = "No cached version available";

#[derive(Debug, Error)]
pub enum AgentError {
    /// The single network attempt failed and no fallback tier applied.
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("{}", NO_CACHED_VERSION)]
    NoCachedVersion,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl AgentError {
    pub fn status(&self) -> StatusCode {
        match self {
            AgentError::Network(_) => StatusCode::BAD_GATEWAY,
            AgentError::NoCachedVersion => StatusCode::SERVICE_UNAVAILABLE,
            AgentError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AgentError::Network(_) => (status, "Bad Gateway").into_response(),
            AgentError::NoCachedVersion => (status, NO_CACHED_VERSION).into_response(),
            other => (
                status,
                Json(serde_json::json!({ "error": other.to_string() })),
            )
                .into_response(),
        }
    }
}
