//! Fix workflow handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mender_engine::OrchestratorState;
use mender_types::{EvaluationFilter, ExecutionStatus, FixEvaluation, FixId, TriggerRequest};
use serde::Serialize;

/// Trigger response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub fix_id: String,
    pub status: ExecutionStatus,
    pub message: String,
}

/// Start a fix workflow. The evaluation exists when this returns; the
/// workflow continues in the background.
pub async fn trigger_fix(
    State(state): State<AppState>,
    request: Option<Json<TriggerRequest>>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    if let Some(time_range) = &request.time_range {
        if mender_types::TimeRange::parse_relative(time_range).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Invalid time_range {}",
                time_range
            )));
        }
    }

    let fix_id = state.orchestrator.start(request, None).await?;

    tracing::info!(fix_id = %fix_id, "Fix workflow started");

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            fix_id: fix_id.to_string(),
            status: ExecutionStatus::InProgress,
            message: "Fix workflow started".to_string(),
        }),
    ))
}

/// List stored evaluations, newest first
pub async fn list_fixes(
    State(state): State<AppState>,
    Query(filter): Query<EvaluationFilter>,
) -> ApiResult<Json<Vec<FixEvaluation>>> {
    if filter.limit == 0 {
        return Err(ApiError::BadRequest("limit must be positive".to_string()));
    }
    let evaluations = state.orchestrator.store().list(filter).await?;
    Ok(Json(evaluations))
}

/// Current workflow response
#[derive(Debug, Serialize)]
pub struct CurrentFixResponse {
    #[serde(flatten)]
    pub state: OrchestratorState,
    pub evaluation: Option<FixEvaluation>,
}

/// Orchestrator phase plus the evaluation of the current or last workflow
pub async fn current_fix(State(state): State<AppState>) -> ApiResult<Json<CurrentFixResponse>> {
    let current = state.orchestrator.state();
    let evaluation = match &current.fix_id {
        Some(id) => state.orchestrator.store().get(id).await?,
        None => None,
    };

    Ok(Json(CurrentFixResponse {
        state: current,
        evaluation,
    }))
}

/// Get one evaluation
pub async fn get_fix(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<FixEvaluation>> {
    state
        .orchestrator
        .store()
        .get(&FixId::new(&id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Fix {} not found", id)))
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

/// Delete one evaluation. The running workflow's evaluation cannot be deleted.
pub async fn delete_fix(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let fix_id = FixId::new(&id);
    let current = state.orchestrator.state();
    if current.in_flight && current.fix_id.as_ref() == Some(&fix_id) {
        return Err(ApiError::FixInProgress { fix_id: Some(id) });
    }

    if !state.orchestrator.store().delete(&fix_id).await? {
        return Err(ApiError::NotFound(format!("Fix {} not found", id)));
    }

    tracing::info!(fix_id = %fix_id, "Deleted evaluation");
    Ok(Json(DeleteResponse { deleted: 1 }))
}

/// Delete every evaluation. Refused while a workflow is running.
pub async fn delete_all_fixes(State(state): State<AppState>) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.orchestrator.delete_all().await?;
    Ok(Json(DeleteResponse { deleted }))
}
