//! Failure injection handlers for simulated infrastructure

use std::sync::Arc;

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::infrastructure::SimulatedInfrastructure;
use axum::{
    extract::{Path, State},
    Json,
};
use mender_types::{MetricMap, ResourceId, ResourceStatus};
use serde::Serialize;

fn simulation(state: &AppState) -> ApiResult<&Arc<SimulatedInfrastructure>> {
    state.simulation.as_ref().ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Failure injection requires simulated infrastructure, running {}",
            state.infrastructure
        ))
    })
}

/// Replace a simulated resource's metrics and return its re-read status
pub async fn inject_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(metrics): Json<MetricMap>,
) -> ApiResult<Json<ResourceStatus>> {
    let id = ResourceId::new(id);
    simulation(&state)?
        .inject(&id, metrics)
        .ok_or_else(|| ApiError::NotFound(format!("Resource {} not found", id)))?;

    let status = state.orchestrator.monitor().refresh(&id).await?;
    Ok(Json(status))
}

/// Reset response
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub resources: Vec<ResourceStatus>,
}

/// Restore every simulated resource to its healthy baseline
pub async fn reset_simulation(State(state): State<AppState>) -> ApiResult<Json<ResetResponse>> {
    simulation(&state)?.reset();
    let resources = state.orchestrator.monitor().refresh_all().await;
    tracing::info!("Simulation reset to baseline");
    Ok(Json(ResetResponse { resources }))
}
