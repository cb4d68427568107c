//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws/{user_id}` - WebSocket upgrade; `user_id` is the session identity
///
/// # Protocol
///
/// Every frame is a JSON object with a `type` field. Clients send
/// `start_session`, `audio_chunk`, `ping`, `test_audio` and `stop_session`.
///
/// Server responds with:
/// - `session_started`, `session_stopped`, `pong` and `audio_received` replies
/// - `status` when the upstream becomes ready or closes
/// - `transcript` for model text and simulated input
/// - `list_updated` with the complete current list
/// - `error` on failures
///
/// # Example
///
/// ```json
/// // Client sends audio
/// {"type": "audio_chunk", "audio_data": "UklGRiQAAABXQVZF...", "timestamp": 1712345678.25}
///
/// // Server acknowledges delivery
/// {"type": "audio_received", "timestamp": 1712345678.25, "chunk_size": 20}
/// ```
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/{user_id}", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
