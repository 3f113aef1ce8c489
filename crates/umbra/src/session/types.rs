//! Session records and their serializable snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::process::WorkerHandle;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Ready,
    Terminating,
    Terminated,
}

/// One active worker session.
///
/// Identity fields are immutable for the record's lifetime. The worker
/// handle lives behind a per-session mutex: holding it serializes teardown
/// against command forwards, so no two teardowns (and no teardown concurrent
/// with a forward) ever run for the same session.
pub struct SessionRecord {
    pub session_id: String,
    /// Exclusively owned for the session's lifetime; returned to the pool
    /// exactly once, on teardown.
    pub port: u16,
    pub created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    last_activity: RwLock<DateTime<Utc>>,
    user_info: RwLock<Option<Value>>,
    /// `None` once teardown has taken the handle (or, in tests, when there
    /// is no real process behind the record).
    pub(crate) worker: Mutex<Option<WorkerHandle>>,
}

impl SessionRecord {
    pub fn new(
        session_id: String,
        port: u16,
        worker: Option<WorkerHandle>,
        user_info: Option<Value>,
    ) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            session_id,
            port,
            created_at: now,
            state: RwLock::new(SessionState::Starting),
            last_activity: RwLock::new(now),
            user_info: RwLock::new(user_info),
            worker: Mutex::new(worker),
        })
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub(crate) async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    /// Bump `last_activity` to now. Timestamps never move backwards.
    pub async fn touch(&self) {
        let now = Utc::now();
        let mut last = self.last_activity.write().await;
        if now > *last {
            *last = now;
        }
    }

    pub async fn set_user_info(&self, info: Option<Value>) {
        *self.user_info.write().await = info;
    }

    /// Process-free snapshot suitable for serialization.
    pub async fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            port: self.port,
            state: self.state().await,
            created_at: self.created_at,
            last_activity: self.last_activity().await,
            user_info: self.user_info.read().await.clone(),
        }
    }
}

/// What callers see of a session. The process handle is never exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub port: u16,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}
