//! Tool catalog handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use mender_types::ToolDescriptor;
use serde::Deserialize;

/// Tool list filter
#[derive(Debug, Default, Deserialize)]
pub struct ToolQuery {
    pub resource_type: Option<String>,
}

/// List tools, optionally by resource family
pub async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<ToolQuery>,
) -> Json<Vec<ToolDescriptor>> {
    Json(
        state
            .orchestrator
            .tools()
            .list_for(query.resource_type.as_deref()),
    )
}

/// Get one tool descriptor
pub async fn get_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ToolDescriptor>> {
    state
        .orchestrator
        .tools()
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Tool {} not found", name)))
}
