//! API route definitions.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    Router::new()
        .route("/health", get(handlers::health))
        // Session management
        .route("/dash/start-session", post(handlers::start_session))
        .route("/dash/sessions", get(handlers::list_sessions))
        .route(
            "/dash/end-session/{session_id}",
            post(handlers::end_session),
        )
        .route(
            "/dash/update-user-info/{session_id}",
            post(handlers::update_user_info),
        )
        .route("/dash/port-status", get(handlers::port_status))
        // Command forwarding
        .route("/send/{session_id}", post(handlers::send_command))
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}
