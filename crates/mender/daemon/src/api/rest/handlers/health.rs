//! Health handler

use crate::api::rest::state::AppState;
use axum::{extract::State, Json};
use mender_engine::Phase;
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub infrastructure: String,
    pub provider: String,
    pub model: String,
    pub phase: Phase,
    pub resources: ResourceSummary,
}

/// Resource counts from the latest snapshots
#[derive(Debug, Serialize)]
pub struct ResourceSummary {
    pub total: usize,
    pub unhealthy: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let orchestrator = &state.orchestrator;
    let snapshots = orchestrator.monitor().snapshot_all();

    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        infrastructure: state.infrastructure.clone(),
        provider: orchestrator.analysis().provider_name().to_string(),
        model: orchestrator.analysis().model().to_string(),
        phase: orchestrator.state().phase,
        resources: ResourceSummary {
            total: orchestrator.monitor().resources().len(),
            unhealthy: snapshots.iter().filter(|s| s.is_unhealthy()).count(),
        },
    })
}
