use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;
use crate::utils::rfc3339_now;

const SERVICE_NAME: &str = "Voice List Gateway";

/// Service banner returned by `GET /`
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub status: &'static str,
    pub active_sessions: usize,
    pub timestamp: String,
}

/// Health report returned by `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub upstream_api_configured: bool,
    pub active_sessions: usize,
}

/// Root endpoint
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME,
        status: "running",
        active_sessions: state.registry.len(),
        timestamp: rfc3339_now(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        upstream_api_configured: state.connector.is_configured(),
        active_sessions: state.registry.len(),
    })
}
