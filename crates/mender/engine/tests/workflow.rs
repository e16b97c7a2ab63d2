use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mender_analysis::{
    AnalysisClient, AnalysisConfig, Completion, CompletionRequest, LlmProvider, ProviderError,
};
use mender_engine::{
    EngineError, EvaluationStore, FixOrchestrator, InMemoryEvaluationStore, OrchestratorConfig,
    Phase, StoreError, StoreResult,
};
use mender_monitor::{LogWindow, MetricAdapter, MonitorConfig, MonitorError, MonitorResult, ResourceMonitor};
use mender_tools::{BackendOutcome, ToolBackend, ToolCallResult, ToolDefaults, ToolRegistry};
use mender_types::{
    ErrorKind, EvaluationFilter, ExecutionStatus, FailureContext, FinalStatus, FixAttempt,
    FixEvaluation, FixId, HealthStatus, LogEntry, MetricMap, ResourceDescriptor, ResourceId,
    ResourceKind, Severity, ToolParams, TriggerRequest,
};
use serde_json::json;
use tokio::sync::Notify;

type World = Arc<Mutex<HashMap<String, MetricMap>>>;

struct WorldAdapter {
    world: World,
}

#[async_trait]
impl MetricAdapter for WorldAdapter {
    fn name(&self) -> &str {
        "world"
    }

    async fn read_metrics(&self, resource: &ResourceDescriptor) -> MonitorResult<MetricMap> {
        self.world
            .lock()
            .unwrap()
            .get(resource.id.as_str())
            .cloned()
            .ok_or_else(|| MonitorError::unavailable(&resource.id, "no metrics"))
    }
}

type Effect = Box<dyn Fn(&mut HashMap<String, MetricMap>) + Send + Sync>;

struct WorldBackend {
    world: World,
    effects: HashMap<&'static str, Effect>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl WorldBackend {
    fn new(world: World) -> Self {
        Self {
            world,
            effects: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn on(mut self, tool: &'static str, effect: impl Fn(&mut HashMap<String, MetricMap>) + Send + Sync + 'static) -> Self {
        self.effects.insert(tool, Box::new(effect));
        self
    }

    fn failing(mut self, tool: &'static str) -> Self {
        self.failing.insert(tool);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolBackend for WorldBackend {
    fn name(&self) -> &str {
        "world"
    }

    async fn invoke(&self, operation: &str, _params: &ToolParams) -> ToolCallResult<BackendOutcome> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.contains(operation) {
            return Ok(BackendOutcome::failed(format!("{} exploded", operation)));
        }
        if let Some(effect) = self.effects.get(operation) {
            effect(&mut self.world.lock().unwrap());
        }
        Ok(BackendOutcome::ok(format!("{} done", operation)))
    }
}

enum Reply {
    Text(String),
    Gated(Arc<Notify>, String),
    Hang,
}

struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scenario"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(Completion::new(text)),
            Some(Reply::Gated(gate, text)) => {
                gate.notified().await;
                Ok(Completion::new(text))
            }
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Completion::new("{}"))
            }
            None => Err(ProviderError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

/// Delegates to the in-memory store but refuses to append attempts.
struct LockedStore {
    inner: Arc<InMemoryEvaluationStore>,
}

#[async_trait]
impl EvaluationStore for LockedStore {
    async fn create(&self, trigger: TriggerRequest, context: FailureContext) -> StoreResult<FixId> {
        self.inner.create(trigger, context).await
    }

    async fn append_attempt(&self, _id: &FixId, _attempt: FixAttempt) -> StoreResult<()> {
        Err(StoreError::Backend("database is locked".to_string()))
    }

    async fn seal(&self, id: &FixId, final_status: FinalStatus) -> StoreResult<()> {
        self.inner.seal(id, final_status).await
    }

    async fn get(&self, id: &FixId) -> StoreResult<Option<FixEvaluation>> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: EvaluationFilter) -> StoreResult<Vec<FixEvaluation>> {
        self.inner.list(filter).await
    }

    async fn delete(&self, id: &FixId) -> StoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn delete_all(&self) -> StoreResult<u64> {
        self.inner.delete_all().await
    }
}

fn plan(steps: serde_json::Value) -> String {
    json!({"root_cause": "scripted", "reasoning": "scenario", "steps": steps}).to_string()
}

fn metrics(pairs: &[(&str, f64)]) -> MetricMap {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn cache() -> ResourceDescriptor {
    ResourceDescriptor::new("cache-1", "redis", ResourceKind::Cache)
}

fn db() -> ResourceDescriptor {
    ResourceDescriptor::new("db-1", "postgres", ResourceKind::RelationalDb)
}

struct Harness {
    orchestrator: Arc<FixOrchestrator>,
    store: Arc<InMemoryEvaluationStore>,
    provider: Arc<ScriptedProvider>,
    backend: Arc<WorldBackend>,
    logs: Arc<LogWindow>,
}

fn harness(
    resources: Vec<(ResourceDescriptor, MetricMap)>,
    replies: Vec<Reply>,
    backend: impl FnOnce(World) -> WorldBackend,
) -> Harness {
    harness_with_store(resources, replies, backend, |store| store as Arc<dyn EvaluationStore>)
}

fn harness_with_store(
    resources: Vec<(ResourceDescriptor, MetricMap)>,
    replies: Vec<Reply>,
    backend: impl FnOnce(World) -> WorldBackend,
    wrap: impl FnOnce(Arc<InMemoryEvaluationStore>) -> Arc<dyn EvaluationStore>,
) -> Harness {
    let world: World = Arc::new(Mutex::new(
        resources
            .iter()
            .map(|(d, m)| (d.id.as_str().to_string(), m.clone()))
            .collect(),
    ));
    let descriptors = resources.into_iter().map(|(d, _)| d).collect();

    let monitor = Arc::new(
        ResourceMonitor::new(MonitorConfig::default(), descriptors).with_adapter_for_all(Arc::new(
            WorldAdapter {
                world: world.clone(),
            },
        )),
    );
    let backend = Arc::new(backend(world));
    let tools = Arc::new(ToolRegistry::standard(backend.clone(), ToolDefaults::default()));
    let provider = ScriptedProvider::new(replies);
    let analysis = Arc::new(AnalysisClient::new(
        provider.clone(),
        AnalysisConfig {
            timeout: Duration::from_secs(5),
            reask_on_malformed: true,
            history_limit: 50,
        },
    ));
    let store = Arc::new(InMemoryEvaluationStore::new());
    let logs = Arc::new(LogWindow::default());

    let config = OrchestratorConfig {
        settle_delay: Duration::ZERO,
        retry_delay: Duration::ZERO,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(FixOrchestrator::new(
        config,
        monitor,
        logs.clone(),
        tools,
        analysis,
        wrap(store.clone()),
    ));

    Harness {
        orchestrator,
        store,
        provider,
        backend,
        logs,
    }
}

#[tokio::test]
async fn test_cache_flush_resolves_memory_pressure() {
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![Reply::Text(plan(json!([{"tool_name": "redis_flush", "parameters": {}}])))],
        |world| {
            WorldBackend::new(world).on("redis_flush", |w| {
                w.insert("cache-1".to_string(), metrics(&[("memory_usage_percent", 12.0)]));
            })
        },
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();

    assert_eq!(evaluation.final_status(), Some(FinalStatus::Success));
    assert_eq!(evaluation.execution_status(), ExecutionStatus::Success);
    assert_eq!(evaluation.total_attempts(), 1);
    assert_eq!(evaluation.tools_used(), vec!["redis_flush"]);

    let before = &evaluation.failure_context().resources[0];
    assert_eq!(before.status, HealthStatus::Failed);

    let attempt = &evaluation.attempts()[0];
    assert!(attempt.issues_resolved);
    assert_eq!(attempt.after[0].status, HealthStatus::Healthy);
    assert!(attempt.tool_results[0].success);

    let state = h.orchestrator.state();
    assert_eq!(state.phase, Phase::DoneSuccess);
    assert!(!state.in_flight);
    assert_eq!(state.fix_id.as_ref(), Some(evaluation.id()));
}

#[tokio::test]
async fn test_unknown_tool_is_dropped_and_rest_of_plan_runs() {
    let h = harness(
        vec![(db(), metrics(&[("total_connections", 90.0), ("max_connections", 100.0)]))],
        vec![Reply::Text(plan(json!([
            {"tool_name": "db_teleport", "parameters": {}},
            {"tool_name": "postgres_kill_long_queries", "parameters": {"duration_seconds": 30}}
        ])))],
        |world| {
            WorldBackend::new(world).on("postgres_kill_long_queries", |w| {
                w.insert(
                    "db-1".to_string(),
                    metrics(&[("total_connections", 20.0), ("max_connections", 100.0)]),
                );
            })
        },
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Success));
    assert_eq!(h.backend.calls(), vec!["postgres_kill_long_queries"]);

    let interaction_id = evaluation.attempts()[0].interaction_id.clone().unwrap();
    let interaction = h.orchestrator.analysis().interaction(&interaction_id).unwrap();
    assert_eq!(interaction.dropped_steps.len(), 1);
    assert_eq!(interaction.dropped_steps[0].tool_name, "db_teleport");
}

#[tokio::test]
async fn test_degraded_db_with_unknown_tool_keeps_valid_steps() {
    let h = harness(
        vec![(db(), metrics(&[("connection_usage_percent", 92.0)]))],
        vec![Reply::Text(plan(json!([
            {"tool_name": "db_teleport", "parameters": {"target": "db-1"}},
            {"tool_name": "postgres_kill_long_queries", "parameters": {"duration_seconds": 60}}
        ])))],
        |world| {
            WorldBackend::new(world).on("postgres_kill_long_queries", |w| {
                w.insert("db-1".to_string(), metrics(&[("connection_usage_percent", 40.0)]));
            })
        },
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();

    let before = &evaluation.failure_context().resources[0];
    assert_eq!(before.status, HealthStatus::Degraded);

    let attempt = &evaluation.attempts()[0];
    let plan = attempt.fix_plan.as_ref().unwrap();
    assert_eq!(plan.tool_names(), vec!["postgres_kill_long_queries"]);
    assert_eq!(h.backend.calls(), vec!["postgres_kill_long_queries"]);
    assert_eq!(attempt.after[0].status, HealthStatus::Healthy);
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Success));
    assert_eq!(evaluation.total_attempts(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded_and_carry_feedback() {
    let useless = || Reply::Text(plan(json!([{"tool_name": "redis_info", "parameters": {}}])));
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![useless(), useless(), useless(), useless()],
        WorldBackend::new,
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();

    assert_eq!(evaluation.final_status(), Some(FinalStatus::FailedAfterRetries));
    assert_eq!(evaluation.execution_status(), ExecutionStatus::Failed);
    assert_eq!(evaluation.terminal_error(), Some(ErrorKind::RetryExhausted));
    assert_eq!(evaluation.total_attempts(), 3);

    let numbers: Vec<u32> = evaluation.attempts().iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let failed = &evaluation.attempts()[0].failed_resources[0];
    assert_eq!(failed.resource_id.as_str(), "cache-1");
    assert_eq!(failed.reason, "Status still FAILED after fix (memory 96%)");

    let prompts = h.provider.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("Previous Attempt"));
    assert!(prompts[1].contains("Previous attempt 1 did not resolve the issue"));
    assert!(prompts[2].contains("Previous attempt 2 did not resolve the issue"));
    assert_eq!(h.orchestrator.state().phase, Phase::DoneFailed);
}

#[tokio::test]
async fn test_tool_failure_does_not_stop_the_plan() {
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![Reply::Text(plan(json!([
            {"tool_name": "redis_info", "parameters": {"section": "memory"}},
            {"tool_name": "docker_restart", "parameters": {"container_name": "worker"}},
            {"tool_name": "redis_flush", "parameters": {"db": 0}}
        ])))],
        |world| {
            WorldBackend::new(world)
                .failing("docker_restart")
                .on("redis_flush", |w| {
                    w.insert("cache-1".to_string(), metrics(&[("memory_usage_percent", 30.0)]));
                })
        },
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();
    let results = &evaluation.attempts()[0].tool_results;

    let order: Vec<&str> = results.iter().map(|r| r.tool_name.as_str()).collect();
    assert_eq!(order, vec!["redis_info", "docker_restart", "redis_flush"]);
    assert!(results[0].success);
    assert!(!results[1].success);
    assert!(results[2].success);
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Success));
}

#[tokio::test]
async fn test_healthy_system_needs_no_action() {
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 10.0)]))],
        Vec::new(),
        WorldBackend::new,
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();
    assert_eq!(evaluation.final_status(), Some(FinalStatus::NoActionNeeded));
    assert_eq!(evaluation.execution_status(), ExecutionStatus::NoActionNeeded);
    assert_eq!(evaluation.total_attempts(), 0);
    assert!(h.provider.prompts().is_empty());
}

#[tokio::test]
async fn test_concurrent_trigger_is_rejected() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![Reply::Gated(
            gate.clone(),
            plan(json!([{"tool_name": "redis_flush", "parameters": {}}])),
        )],
        |world| {
            WorldBackend::new(world).on("redis_flush", |w| {
                w.insert("cache-1".to_string(), metrics(&[("memory_usage_percent", 5.0)]));
            })
        },
    );

    let mut state = h.orchestrator.subscribe();
    let fix_id = h
        .orchestrator
        .start(TriggerRequest::default(), None)
        .await
        .unwrap();
    assert!(h.orchestrator.is_busy());

    let err = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap_err();
    match err {
        EngineError::FixInProgress { fix_id: running } => assert_eq!(running, Some(fix_id.clone())),
        other => panic!("expected FixInProgress, got {:?}", other),
    }
    assert_eq!(h.store.len(), 1);

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| !s.in_flight))
        .await
        .unwrap()
        .unwrap();

    let evaluation = h.store.get(&fix_id).await.unwrap().unwrap();
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Success));

    // The slot is free again.
    let again = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();
    assert_eq!(again.final_status(), Some(FinalStatus::NoActionNeeded));
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_deadline_cancels_analysis() {
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![Reply::Hang],
        WorldBackend::new,
    );

    let evaluation = h
        .orchestrator
        .trigger_with_deadline(TriggerRequest::default(), Duration::from_millis(100))
        .await
        .unwrap();

    assert_eq!(evaluation.final_status(), Some(FinalStatus::Failed));
    assert_eq!(evaluation.terminal_error(), Some(ErrorKind::Cancelled));
    assert_eq!(evaluation.total_attempts(), 1);
    assert!(evaluation.attempts()[0].fix_plan.is_none());
    assert!(h.backend.calls().is_empty());

    assert_eq!(h.provider.prompts().len(), 1);
    let interaction_id = evaluation.attempts()[0]
        .interaction_id
        .clone()
        .expect("cancelled attempt links its interaction");
    let interaction = h.orchestrator.analysis().interaction(&interaction_id).unwrap();
    assert_eq!(interaction.prompt, h.provider.prompts()[0]);
    assert_eq!(interaction.error.as_deref(), Some("cancelled: deadline expired"));
    assert_eq!(h.orchestrator.analysis().history(10).len(), 1);
}

#[tokio::test]
async fn test_unparsable_replies_fail_the_workflow() {
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![
            Reply::Text("restart everything".to_string()),
            Reply::Text("I said restart everything".to_string()),
        ],
        WorldBackend::new,
    );

    let evaluation = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Failed));
    assert_eq!(evaluation.terminal_error(), Some(ErrorKind::AnalysisError));
    assert_eq!(h.provider.prompts().len(), 2);
    assert!(evaluation.attempts()[0].interaction_id.is_some());
}

#[tokio::test]
async fn test_trigger_scope_limits_resources_and_logs() {
    let h = harness(
        vec![
            (cache(), metrics(&[("memory_usage_percent", 10.0)])),
            (db(), metrics(&[("total_connections", 99.0), ("max_connections", 100.0)])),
        ],
        Vec::new(),
        WorldBackend::new,
    );
    h.logs.record(LogEntry::new(ResourceId::new("cache-1"), Severity::Error, "OOM command not allowed"));
    h.logs.record(LogEntry::new(ResourceId::new("db-1"), Severity::Error, "too many clients"));
    h.logs.record(LogEntry::new(ResourceId::new("cache-1"), Severity::Info, "ready"));

    let request = TriggerRequest {
        resource_ids: Some(vec![ResourceId::new("cache-1"), ResourceId::new("ghost")]),
        time_range: Some("15m".to_string()),
    };
    let evaluation = h.orchestrator.trigger(request).await.unwrap();

    let context = evaluation.failure_context();
    assert_eq!(context.resource_ids(), vec![ResourceId::new("cache-1")]);
    assert_eq!(context.logs.len(), 1);
    assert_eq!(context.logs[0].message, "OOM command not allowed");
    assert_eq!(evaluation.final_status(), Some(FinalStatus::NoActionNeeded));
}

#[tokio::test]
async fn test_store_failure_still_seals_the_evaluation() {
    let h = harness_with_store(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![Reply::Text(plan(json!([{"tool_name": "redis_flush", "parameters": {}}])))],
        WorldBackend::new,
        |store| Arc::new(LockedStore { inner: store }) as Arc<dyn EvaluationStore>,
    );

    let err = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Backend(_))));

    let evaluations = h.store.list(EvaluationFilter::default()).await.unwrap();
    assert_eq!(evaluations.len(), 1);
    let evaluation = &evaluations[0];
    assert!(evaluation.is_sealed());
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Failed));
    assert_eq!(evaluation.terminal_error(), Some(ErrorKind::Interrupted));

    let state = h.orchestrator.state();
    assert_eq!(state.phase, Phase::DoneFailed);
    assert!(!state.in_flight);
}

#[tokio::test]
async fn test_abandoned_evaluations_are_sealed() {
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 10.0)]))],
        Vec::new(),
        WorldBackend::new,
    );
    let context = FailureContext::new(Vec::new(), Vec::new(), serde_json::Value::Null);
    let abandoned = h.store.create(TriggerRequest::default(), context).await.unwrap();
    let finished = h.orchestrator.trigger(TriggerRequest::default()).await.unwrap();

    assert_eq!(h.orchestrator.seal_abandoned().await.unwrap(), 1);

    let evaluation = h.store.get(&abandoned).await.unwrap().unwrap();
    assert_eq!(evaluation.final_status(), Some(FinalStatus::Failed));
    assert_eq!(evaluation.terminal_error(), Some(ErrorKind::Interrupted));

    let untouched = h.store.get(finished.id()).await.unwrap().unwrap();
    assert_eq!(untouched.final_status(), Some(FinalStatus::NoActionNeeded));
    assert_eq!(h.orchestrator.seal_abandoned().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_all_waits_for_the_workflow_slot() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        vec![(cache(), metrics(&[("memory_usage_percent", 96.0)]))],
        vec![Reply::Gated(
            gate.clone(),
            plan(json!([{"tool_name": "redis_flush", "parameters": {}}])),
        )],
        |world| {
            WorldBackend::new(world).on("redis_flush", |w| {
                w.insert("cache-1".to_string(), metrics(&[("memory_usage_percent", 5.0)]));
            })
        },
    );

    let mut state = h.orchestrator.subscribe();
    let fix_id = h
        .orchestrator
        .start(TriggerRequest::default(), None)
        .await
        .unwrap();

    let err = h.orchestrator.delete_all().await.unwrap_err();
    assert!(matches!(err, EngineError::FixInProgress { .. }));
    assert_eq!(h.store.len(), 1);

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| !s.in_flight))
        .await
        .unwrap()
        .unwrap();
    assert!(h.store.get(&fix_id).await.unwrap().unwrap().is_sealed());

    assert_eq!(h.orchestrator.delete_all().await.unwrap(), 1);
    assert!(h.store.is_empty());
}
