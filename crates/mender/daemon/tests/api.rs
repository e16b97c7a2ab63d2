use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use mender_analysis::{Completion, CompletionRequest, LlmProvider, ProviderError};
use mender_daemon::api::create_router;
use mender_daemon::config::StorageConfig;
use mender_daemon::{storage, Components, DaemonConfig};
use mender_engine::EvaluationStore;
use mender_types::{FailureContext, TriggerRequest};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

const FLUSH_PLAN: &str = r#"{
    "root_cause": "cache memory exhausted",
    "reasoning": "memory usage is above the failure threshold",
    "steps": [
        {"tool_name": "redis_flush", "parameters": {"db": 0}, "description": "drop cached keys"}
    ]
}"#;

struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            gate: None,
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let reply = self.replies.lock().unwrap().pop_front();
        reply
            .map(Completion::new)
            .ok_or_else(|| ProviderError::Request("no scripted reply left".to_string()))
    }
}

fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::development();
    config.orchestrator.settle_delay_ms = 0;
    config.orchestrator.retry_delay_ms = 0;
    config
}

async fn app_from(config: DaemonConfig, provider: ScriptedProvider) -> Router {
    let components = Components::build(&config, Arc::new(provider)).await.unwrap();
    create_router(components.state, true, Duration::from_secs(30))
}

async fn app_with(provider: ScriptedProvider) -> Router {
    app_from(test_config(), provider).await
}

async fn app() -> Router {
    app_with(ScriptedProvider::new(&[FLUSH_PLAN])).await
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn wait_for_seal(app: &Router, fix_id: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, "GET", &format!("/api/fixes/{}", fix_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if !body["sealed_at"].is_null() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fix {} was not sealed", fix_id);
}

async fn inject_full_cache(app: &Router) {
    let (status, body) = send(
        app,
        "POST",
        "/api/simulation/resources/redis/metrics",
        Some(json!({"memory_usage_percent": 97.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILED");
}

#[tokio::test]
async fn test_health_reports_provider_and_phase() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["provider"], "scripted");
    assert_eq!(body["infrastructure"], "simulated");
    assert_eq!(body["phase"], "IDLE");
    assert_eq!(body["resources"]["total"], 4);
}

#[tokio::test]
async fn test_tool_catalog_endpoints() {
    let app = app().await;

    let (status, body) = send(&app, "GET", "/api/mcp/tools?resource_type=cache", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"redis_flush"));
    assert!(names.iter().all(|n| n.contains("redis")));

    let (status, body) = send(&app, "GET", "/api/mcp/tools/docker_restart", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parameters"]["container_name"]["required"], true);

    let (status, body) = send(&app, "GET", "/api/mcp/tools/db_teleport", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_injected_failure_is_fixed_end_to_end() {
    let app = app().await;
    inject_full_cache(&app).await;

    let (status, body) = send(&app, "POST", "/api/fixes/trigger", Some(json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let fix_id = body["fix_id"].as_str().unwrap().to_string();
    assert!(fix_id.starts_with("fix_"));

    let evaluation = wait_for_seal(&app, &fix_id).await;
    assert_eq!(evaluation["execution_status"], "SUCCESS");
    assert_eq!(evaluation["final_status"], "SUCCESS");
    assert_eq!(evaluation["total_attempts"], 1);
    assert_eq!(evaluation["tools_used"], json!(["redis_flush"]));
    assert_eq!(evaluation["root_cause"], "cache memory exhausted");

    let (_, interactions) = send(&app, "GET", "/api/llm/interactions", None).await;
    assert_eq!(interactions.as_array().unwrap().len(), 1);
    let interaction_id = interactions[0]["id"].as_str().unwrap().to_string();
    assert_eq!(evaluation["interaction_ids"], json!([interaction_id.clone()]));

    let (status, _) = send(&app, "GET", &format!("/api/llm/interactions/{}", interaction_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, resource) = send(&app, "GET", "/api/resources/redis/metrics", None).await;
    assert_eq!(resource["status"], "HEALTHY");

    let (_, errors) = send(&app, "GET", "/api/logs/errors?time_range=15m&resource_id=redis", None).await;
    assert!(errors
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["message"].as_str().unwrap().contains("OOM")));

    let (_, listed) = send(&app, "GET", "/api/fixes?status=SUCCESS", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_healthy_trigger_needs_no_action() {
    let app = app().await;

    let (status, body) = send(&app, "POST", "/api/fixes/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let evaluation = wait_for_seal(&app, body["fix_id"].as_str().unwrap()).await;
    assert_eq!(evaluation["execution_status"], "NO_ACTION_NEEDED");
    assert_eq!(evaluation["total_attempts"], 0);

    let (_, interactions) = send(&app, "GET", "/api/llm/interactions", None).await;
    assert!(interactions.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_trigger_conflicts_while_fix_runs() {
    let gate = Arc::new(Notify::new());
    let app = app_with(ScriptedProvider::new(&[FLUSH_PLAN]).gated(gate.clone())).await;
    inject_full_cache(&app).await;

    let (status, first) = send(&app, "POST", "/api/fixes/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let fix_id = first["fix_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "POST", "/api/fixes/trigger", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "FIX_IN_PROGRESS");
    assert_eq!(body["details"]["fix_id"], fix_id.as_str());

    let (status, _) = send(&app, "DELETE", "/api/fixes", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, current) = send(&app, "GET", "/api/fixes/current", None).await;
    assert_eq!(current["in_flight"], true);
    assert_eq!(current["fix_id"], fix_id.as_str());

    gate.notify_one();
    let evaluation = wait_for_seal(&app, &fix_id).await;
    assert_eq!(evaluation["execution_status"], "SUCCESS");

    let (_, listed) = send(&app, "GET", "/api/fixes", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fix_records_can_be_deleted() {
    let app = app().await;
    let (_, body) = send(&app, "POST", "/api/fixes/trigger", None).await;
    let fix_id = body["fix_id"].as_str().unwrap().to_string();
    wait_for_seal(&app, &fix_id).await;

    let (status, body) = send(&app, "DELETE", &format!("/api/fixes/{}", fix_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, _) = send(&app, "GET", &format!("/api/fixes/{}", fix_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "DELETE", "/api/fixes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let app = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/fixes/trigger",
        Some(json!({"time_range": "yesterday"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, _) = send(&app, "GET", "/api/logs/errors?time_range=soon", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/logs/errors?time_range=1%C3%A9", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/fixes/trigger",
        Some(json!({"time_range": "100000000d"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/fixes?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/simulation/resources/mainframe/metrics",
        Some(json!({"memory_usage_percent": 50.0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/resources/mainframe", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resource_status_overview() {
    let app = app().await;
    inject_full_cache(&app).await;

    let (status, body) = send(&app, "GET", "/api/resources/status?refresh=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["healthy"], 3);
    assert_eq!(body["resources"].as_array().unwrap().len(), 4);

    let (status, body) = send(&app, "POST", "/api/simulation/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resources"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["status"] == "HEALTHY"));

    let (_, resources) = send(&app, "GET", "/api/resources", None).await;
    assert_eq!(resources[0]["kind"], "cache");
}

#[tokio::test]
async fn test_startup_seals_unfinished_evaluations() {
    let path = std::env::temp_dir().join(format!(
        "mender-restart-{}-{}.db",
        std::process::id(),
        chrono::Utc::now().timestamp_micros()
    ));
    let mut config = test_config();
    config.storage = StorageConfig::Sqlite {
        url: format!("sqlite://{}", path.display()),
        max_connections: 1,
    };

    let store = storage::open(&config.storage).await.unwrap();
    let context = FailureContext::new(Vec::new(), Vec::new(), Value::Null);
    let fix_id = store.create(TriggerRequest::default(), context).await.unwrap();
    drop(store);

    let app = app_from(config, ScriptedProvider::new(&[])).await;
    let (status, body) = send(&app, "GET", &format!("/api/fixes/{}", fix_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["final_status"], "FAILED");
    assert_eq!(body["terminal_error"], "Interrupted");
    assert!(!body["sealed_at"].is_null());

    let _ = std::fs::remove_file(&path);
}
