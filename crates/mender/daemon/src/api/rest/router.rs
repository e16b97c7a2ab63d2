//! API Router configuration

use std::time::Duration;

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool, request_timeout: Duration) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Fixes
        .route("/fixes/trigger", post(handlers::trigger_fix))
        .route("/fixes/current", get(handlers::current_fix))
        .route(
            "/fixes",
            get(handlers::list_fixes).delete(handlers::delete_all_fixes),
        )
        .route(
            "/fixes/:id",
            get(handlers::get_fix).delete(handlers::delete_fix),
        )
        // Tools
        .route("/mcp/tools", get(handlers::list_tools))
        .route("/mcp/tools/:name", get(handlers::get_tool))
        // Analysis history
        .route("/llm/interactions", get(handlers::list_interactions))
        .route("/llm/interactions/:id", get(handlers::get_interaction))
        // Logs
        .route("/logs", get(handlers::list_logs))
        .route("/logs/errors", get(handlers::error_logs))
        // Resources
        .route("/resources", get(handlers::list_resources))
        .route("/resources/status", get(handlers::resources_status))
        .route("/resources/:id", get(handlers::get_resource))
        .route("/resources/:id/metrics", get(handlers::get_resource_metrics))
        // Simulation
        .route(
            "/simulation/resources/:id/metrics",
            post(handlers::inject_metrics),
        )
        .route("/simulation/reset", post(handlers::reset_simulation));

    let router = Router::new()
        .nest("/api", api_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
