//! In-memory session registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::types::SessionRecord;

/// The authoritative map of session id to session record.
///
/// An owned component instance, not a module-level singleton: every manager
/// (including each manager a test constructs) holds its own registry. The map lock covers
/// only map mutation; listing snapshots the `Arc`s under the read lock and
/// releases it before any further work.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, record: Arc<SessionRecord>) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(record.session_id.clone(), record);
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionRecord>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionRecord>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id)
    }

    /// Snapshot of all records, copied under the read lock.
    pub async fn snapshot(&self) -> Vec<Arc<SessionRecord>> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    /// Bump a session's activity timestamp. Returns whether it exists.
    pub async fn touch(&self, session_id: &str) -> bool {
        match self.get(session_id).await {
            Some(record) => {
                record.touch().await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
