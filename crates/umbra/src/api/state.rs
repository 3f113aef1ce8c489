//! Shared application state for the HTTP layer.

use std::sync::Arc;

use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}
