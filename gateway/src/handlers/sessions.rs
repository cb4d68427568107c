//! Administrative session endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::core::session::SessionSnapshot;
use crate::errors::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub active_sessions: usize,
    pub sessions: Vec<SessionSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct TerminateResponse {
    pub message: String,
}

/// List active sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionList> {
    let sessions = state.registry.list();
    Json(SessionList {
        active_sessions: sessions.len(),
        sessions,
    })
}

/// Force-terminate a session
///
/// Closes the client connection; the session then runs its normal teardown.
pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<TerminateResponse>> {
    state.registry.terminate(&user_id)?;
    info!(user_id = %user_id, "Session terminated by admin request");

    Ok(Json(TerminateResponse {
        message: format!("Session {user_id} terminated"),
    }))
}
