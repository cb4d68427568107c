use axum::{
    Router,
    routing::{delete, get},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, sessions};
use crate::state::AppState;
use std::sync::Arc;

/// Create the REST API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::service_info))
        .route("/health", get(api::health_check))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/{user_id}", delete(sessions::terminate_session))
        .layer(TraceLayer::new_for_http())
}
