//! Analysis history handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use mender_analysis::DEFAULT_HISTORY_PAGE;
use mender_types::{InteractionId, LlmInteraction};
use serde::Deserialize;

/// History page
#[derive(Debug, Deserialize)]
pub struct InteractionQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_HISTORY_PAGE
}

/// Most recent interactions first
pub async fn list_interactions(
    State(state): State<AppState>,
    Query(query): Query<InteractionQuery>,
) -> Json<Vec<LlmInteraction>> {
    Json(state.orchestrator.analysis().history(query.limit))
}

/// Get one interaction
pub async fn get_interaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LlmInteraction>> {
    state
        .orchestrator
        .analysis()
        .interaction(&InteractionId::new(&id))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Interaction {} not found", id)))
}
