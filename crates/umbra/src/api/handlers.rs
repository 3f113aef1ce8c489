//! Request handlers. Status-code mapping for session errors lives on
//! [`SessionError`]'s `IntoResponse` impl.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Serialize;
use serde_json::Value;

use crate::error::SessionError;
use crate::session::{PortStatus, SessionInfo};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Start a new session. An optional JSON body becomes the session's opaque
/// user-info bag.
pub async fn start_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SessionInfo>, SessionError> {
    let user_info = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };
    let info = state.manager.start_session(user_info).await?;
    Ok(Json(info))
}

/// List active sessions. Idle sessions are swept before the snapshot is
/// taken, so stale entries never appear.
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.manager.list_sessions().await)
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SuccessResponse>, SessionError> {
    state.manager.end_session(&session_id, "manual").await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn update_user_info(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(info): Json<Value>,
) -> Result<Json<SessionInfo>, SessionError> {
    let info = state.manager.update_user_info(&session_id, info).await?;
    Ok(Json(info))
}

pub async fn port_status(State(state): State<AppState>) -> Json<PortStatus> {
    Json(state.manager.port_status())
}

/// Forward a command envelope to a session's worker and return the worker's
/// response envelope unmodified.
pub async fn send_command(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(command): Json<Value>,
) -> Result<Json<Value>, SessionError> {
    let response = state.manager.forward_command(&session_id, command).await?;
    Ok(Json(response))
}
