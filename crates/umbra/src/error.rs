//! Error taxonomy for session operations and their HTTP status mapping.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Result type for session manager operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures of a single proxied request/reply exchange with a worker.
///
/// The proxy client never retries; retry policy belongs to its callers.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The worker is not listening (not up yet, or dead).
    #[error("worker unreachable on port {port}: {source}")]
    Unreachable {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The worker answered, but not with a parseable envelope.
    #[error("malformed worker response: {0}")]
    Protocol(String),

    /// No response within the per-call deadline.
    #[error("no response from worker within {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by session manager operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Every port in the configured range is reserved.
    #[error("no available ports in pool")]
    Exhausted,

    /// The worker process could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// The worker never answered the readiness probe.
    #[error("worker failed to become ready within {0:?}")]
    ReadinessTimeout(Duration),

    /// Unknown, expired, or already-ended session.
    #[error("session not found")]
    NotFound,

    /// A command forward failed at the proxy layer. The session stays
    /// registered; the worker may recover on its own.
    #[error("command forwarding failed: {0}")]
    Forward(#[from] ProxyError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SessionError::Exhausted => (StatusCode::SERVICE_UNAVAILABLE, "PORTS_EXHAUSTED"),
            SessionError::Spawn(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SPAWN_FAILED"),
            SessionError::ReadinessTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "WORKER_NOT_READY"),
            SessionError::NotFound => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            SessionError::Forward(ProxyError::Timeout(_)) => {
                (StatusCode::GATEWAY_TIMEOUT, "WORKER_TIMEOUT")
            }
            SessionError::Forward(ProxyError::Unreachable { .. }) => {
                (StatusCode::BAD_GATEWAY, "WORKER_UNREACHABLE")
            }
            SessionError::Forward(ProxyError::Protocol(_)) => {
                (StatusCode::BAD_GATEWAY, "WORKER_PROTOCOL")
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}
