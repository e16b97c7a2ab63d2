//! Log handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Query, State},
    Json,
};
use mender_monitor::LogQuery;
use mender_types::{LogEntry, ResourceId, TimeRange};
use serde::Deserialize;

/// Query recent log entries by level, resource and limit
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let entries = state
        .orchestrator
        .logs()
        .query(&query)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(entries))
}

/// Error log filter
#[derive(Debug, Deserialize)]
pub struct ErrorLogQuery {
    pub time_range: Option<String>,
    pub resource_id: Option<ResourceId>,
}

/// Warning-and-above entries within a relative time range (default 1h)
pub async fn error_logs(
    State(state): State<AppState>,
    Query(query): Query<ErrorLogQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let window = query.time_range.as_deref().unwrap_or("1h");
    let range = TimeRange::parse_relative(window)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid time_range {}", window)))?;

    let scope = query.resource_id.map(|id| vec![id]);
    let entries = state
        .orchestrator
        .logs()
        .query_errors(range, scope.as_deref())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(entries))
}
