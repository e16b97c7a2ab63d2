//! Resource handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use mender_types::{
    HealthStatus, MetricMap, ResourceDescriptor, ResourceId, ResourceStatus,
};
use serde::{Deserialize, Serialize};

/// List configured resources
pub async fn list_resources(State(state): State<AppState>) -> Json<Vec<ResourceDescriptor>> {
    Json(state.orchestrator.monitor().resources().to_vec())
}

/// Status query
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Re-read every resource instead of returning the last poll
    #[serde(default)]
    pub refresh: bool,
}

/// Resource status overview
#[derive(Debug, Serialize)]
pub struct ResourcesStatusResponse {
    pub healthy: usize,
    pub degraded: usize,
    pub failed: usize,
    pub unknown: usize,
    pub resources: Vec<ResourceStatus>,
}

/// Latest status of every resource
pub async fn resources_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<ResourcesStatusResponse> {
    let monitor = state.orchestrator.monitor();
    let resources = if query.refresh {
        monitor.refresh_all().await
    } else {
        monitor.snapshot_all()
    };

    let count = |status: HealthStatus| resources.iter().filter(|r| r.status == status).count();

    Json(ResourcesStatusResponse {
        healthy: count(HealthStatus::Healthy),
        degraded: count(HealthStatus::Degraded),
        failed: count(HealthStatus::Failed),
        unknown: count(HealthStatus::Unknown),
        resources,
    })
}

/// Status of one resource, read now if it has not been polled yet
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResourceStatus>> {
    let id = ResourceId::new(id);
    let monitor = state.orchestrator.monitor();

    if monitor.descriptor(&id).is_none() {
        return Err(ApiError::NotFound(format!("Resource {} not found", id)));
    }

    match monitor.snapshot(&id) {
        Some(status) => Ok(Json(status)),
        None => Ok(Json(monitor.refresh(&id).await?)),
    }
}

/// Fresh metric reading
#[derive(Debug, Serialize)]
pub struct ResourceMetricsResponse {
    pub resource_id: ResourceId,
    pub status: HealthStatus,
    pub metrics: MetricMap,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read one resource's metrics now
pub async fn get_resource_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResourceMetricsResponse>> {
    let status = state
        .orchestrator
        .monitor()
        .refresh(&ResourceId::new(id))
        .await?;

    Ok(Json(ResourceMetricsResponse {
        resource_id: status.id,
        status: status.status,
        metrics: status.metrics,
        last_updated: status.last_updated,
        error: status.error,
    }))
}
