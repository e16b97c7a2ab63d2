//! In-process simulated infrastructure
//!
//! Every configured resource starts at a healthy baseline for its kind.
//! Failures are injected by replacing a resource's metrics; tools act on the
//! simulated world by restoring the targeted resources to their baseline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mender_monitor::{
    keys, LogQuery, LogSource, LogWindow, MetricAdapter, MonitorError, MonitorResult,
    ThresholdConfig,
};
use mender_tools::{BackendOutcome, ToolBackend, ToolCallResult};
use mender_types::{HealthStatus, MetricMap, ResourceDescriptor, ResourceId, ResourceKind, ToolParams};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Parameters that name the resource an operation acts on.
const TARGET_PARAMS: [&str; 3] = ["container_name", "instance_name", "instance_id"];

/// Simulated resources acting as both metric adapter and tool backend.
pub struct SimulatedInfrastructure {
    resources: Vec<ResourceDescriptor>,
    world: RwLock<HashMap<ResourceId, MetricMap>>,
    logs: Arc<LogWindow>,
    thresholds: ThresholdConfig,
}

impl SimulatedInfrastructure {
    pub fn new(
        resources: Vec<ResourceDescriptor>,
        logs: Arc<LogWindow>,
        thresholds: ThresholdConfig,
    ) -> Self {
        let world = resources
            .iter()
            .map(|r| (r.id.clone(), baseline(r.kind)))
            .collect();
        Self {
            resources,
            world: RwLock::new(world),
            logs,
            thresholds,
        }
    }

    /// Current metrics of one resource.
    pub fn metrics(&self, id: &ResourceId) -> Option<MetricMap> {
        self.world.read().get(id).cloned()
    }

    /// Replace a resource's metrics and emit the log line a real system would.
    ///
    /// Returns the health the new metrics evaluate to, or `None` for an
    /// unknown resource.
    pub fn inject(&self, id: &ResourceId, metrics: MetricMap) -> Option<HealthStatus> {
        let descriptor = self.resources.iter().find(|r| &r.id == id)?;
        let status = mender_monitor::evaluate(descriptor.kind, &metrics, &self.thresholds);

        if let Some(message) = failure_message(descriptor, status, &metrics) {
            self.logs.record_message(descriptor.id.clone(), message);
        }
        self.world.write().insert(id.clone(), metrics);

        info!(resource_id = %id, status = %status, "Injected simulated metrics");
        Some(status)
    }

    /// Restore every resource to its baseline.
    pub fn reset(&self) {
        let mut world = self.world.write();
        for resource in &self.resources {
            world.insert(resource.id.clone(), baseline(resource.kind));
        }
    }

    fn targets(&self, kind: ResourceKind, params: &ToolParams) -> Result<Vec<ResourceDescriptor>, String> {
        let of_kind = self.resources.iter().filter(|r| r.kind == kind);

        let named = TARGET_PARAMS
            .iter()
            .find_map(|key| params.get(*key).and_then(Value::as_str));

        match named {
            Some(name) => {
                let matched: Vec<ResourceDescriptor> = of_kind
                    .filter(|r| r.target() == name || r.name == name || r.id.as_str() == name)
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    Err(format!("no simulated {} named {}", kind, name))
                } else {
                    Ok(matched)
                }
            }
            None => Ok(of_kind.cloned().collect()),
        }
    }

    async fn apply(&self, operation: &str, kind: ResourceKind, params: &ToolParams) -> BackendOutcome {
        let targets = match self.targets(kind, params) {
            Ok(targets) => targets,
            Err(reason) => return BackendOutcome::failed(reason),
        };
        let names: Vec<&str> = targets.iter().map(|r| r.name.as_str()).collect();

        match Effect::of(operation) {
            Effect::Report => {
                let world = self.world.read();
                let report: serde_json::Map<String, Value> = targets
                    .iter()
                    .map(|r| (r.name.clone(), json!(world.get(&r.id))))
                    .collect();
                BackendOutcome::ok(format!("{} returned metrics for {}", operation, names.join(", ")))
                    .with_metadata(Value::Object(report))
            }
            Effect::Logs => {
                let tail = params.get("tail").and_then(Value::as_u64).unwrap_or(100) as usize;
                let mut lines = Vec::new();
                for target in &targets {
                    lines.extend(self.recent_lines(&target.id, tail).await);
                }
                BackendOutcome::ok(format!("{} returned {} lines", operation, lines.len()))
                    .with_metadata(json!({ "lines": lines }))
            }
            Effect::NoChange => BackendOutcome::ok(format!("{} completed on {}", operation, names.join(", "))),
            Effect::Restore => {
                self.update(&targets, |kind, metrics| *metrics = baseline(kind));
                self.note(&targets, operation);
                BackendOutcome::ok(format!("{} completed on {}", operation, names.join(", ")))
            }
            Effect::Stop => {
                self.update(&targets, |_, metrics| {
                    metrics.insert(keys::CPU_USAGE_PERCENT.to_string(), 0.0);
                    metrics.insert(keys::MEMORY_USAGE_PERCENT.to_string(), 0.0);
                });
                self.note(&targets, operation);
                BackendOutcome::ok(format!("{} stopped {}", operation, names.join(", ")))
            }
            Effect::Capacity(key) => {
                let Some(capacity) = params.get(key).and_then(Value::as_f64) else {
                    return BackendOutcome::failed(format!("{} requires {}", operation, key));
                };
                self.update(&targets, |_, metrics| {
                    metrics.insert(key.to_string(), capacity);
                });
                self.note(&targets, operation);
                BackendOutcome::ok(format!("{} set {} to {} on {}", operation, key, capacity, names.join(", ")))
            }
        }
    }

    fn update<F>(&self, targets: &[ResourceDescriptor], mut change: F)
    where
        F: FnMut(ResourceKind, &mut MetricMap),
    {
        let mut world = self.world.write();
        for target in targets {
            if let Some(metrics) = world.get_mut(&target.id) {
                change(target.kind, metrics);
            }
        }
    }

    fn note(&self, targets: &[ResourceDescriptor], operation: &str) {
        for target in targets {
            self.logs
                .record_message(target.id.clone(), format!("INFO {} applied to {}", operation, target.name));
        }
    }

    async fn recent_lines(&self, id: &ResourceId, tail: usize) -> Vec<String> {
        let query = LogQuery {
            level: None,
            resource_id: Some(id.clone()),
            limit: Some(tail),
        };
        self.logs
            .query(&query)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|entry| format!("{} {}", entry.timestamp.to_rfc3339(), entry.message))
            .collect()
    }
}

#[async_trait]
impl MetricAdapter for SimulatedInfrastructure {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn read_metrics(&self, resource: &ResourceDescriptor) -> MonitorResult<MetricMap> {
        self.metrics(&resource.id)
            .ok_or_else(|| MonitorError::unavailable(&resource.id, "not simulated"))
    }
}

#[async_trait]
impl ToolBackend for SimulatedInfrastructure {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn invoke(&self, operation: &str, params: &ToolParams) -> ToolCallResult<BackendOutcome> {
        debug!(operation, "Simulated operation");
        let outcome = match operation_kind(operation) {
            Some(kind) => self.apply(operation, kind, params).await,
            None => BackendOutcome::failed(format!("{} is not simulated", operation)),
        };
        Ok(outcome)
    }
}

/// What an operation does to the simulated world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Report,
    Logs,
    NoChange,
    Restore,
    Stop,
    Capacity(&'static str),
}

impl Effect {
    fn of(operation: &str) -> Self {
        match operation {
            "redis_info" | "nginx_info" | "docker_stats" => Effect::Report,
            "docker_logs" => Effect::Logs,
            "postgres_vacuum" | "docker_scale" => Effect::NoChange,
            "gcp_compute_stop_instance" => Effect::Stop,
            "postgres_scale_connections" => Effect::Capacity(keys::MAX_CONNECTIONS),
            "nginx_scale_connections" => Effect::Capacity(keys::WORKER_CONNECTIONS),
            _ => Effect::Restore,
        }
    }
}

fn operation_kind(operation: &str) -> Option<ResourceKind> {
    const PREFIXES: [(&str, ResourceKind); 7] = [
        ("redis_", ResourceKind::Cache),
        ("gcp_redis_", ResourceKind::Cache),
        ("postgres_", ResourceKind::RelationalDb),
        ("gcp_sql_", ResourceKind::RelationalDb),
        ("nginx_", ResourceKind::Proxy),
        ("docker_", ResourceKind::Container),
        ("gcp_compute_", ResourceKind::CloudInstance),
    ];
    PREFIXES
        .iter()
        .find(|(prefix, _)| operation.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

/// Healthy metrics for a resource kind.
pub fn baseline(kind: ResourceKind) -> MetricMap {
    let pairs: &[(&str, f64)] = match kind {
        ResourceKind::Cache => &[(keys::MEMORY_USAGE_PERCENT, 35.0)],
        ResourceKind::RelationalDb => &[(keys::TOTAL_CONNECTIONS, 12.0), (keys::MAX_CONNECTIONS, 100.0)],
        ResourceKind::Proxy => &[(keys::ACTIVE_CONNECTIONS, 40.0), (keys::WORKER_CONNECTIONS, 1024.0)],
        ResourceKind::Container => &[(keys::RUNNING, 1.0), (keys::MEMORY_USAGE_PERCENT, 30.0)],
        ResourceKind::CloudInstance => &[
            (keys::CPU_USAGE_PERCENT, 25.0),
            (keys::MEMORY_USAGE_PERCENT, 40.0),
            (keys::DISK_USAGE_PERCENT, 50.0),
        ],
    };
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn failure_message(descriptor: &ResourceDescriptor, status: HealthStatus, metrics: &MetricMap) -> Option<String> {
    let level = match status {
        HealthStatus::Failed => "ERROR",
        HealthStatus::Degraded => "WARN",
        HealthStatus::Healthy | HealthStatus::Unknown => return None,
    };
    let reading = mender_monitor::thresholds::primary_reading(descriptor.kind, metrics)
        .map(|(label, value)| format!("{} {:.0}%", label, value))
        .unwrap_or_default();

    let detail = match descriptor.kind {
        ResourceKind::Cache => format!("OOM command not allowed when used memory > 'maxmemory' ({})", reading),
        ResourceKind::RelationalDb => format!("too many clients already ({})", reading),
        ResourceKind::Proxy => format!("worker_connections are not enough ({})", reading),
        ResourceKind::Container if metrics.get(keys::RUNNING) == Some(&0.0) => {
            "container exited unexpectedly".to_string()
        }
        ResourceKind::Container => format!("container memory pressure ({})", reading),
        ResourceKind::CloudInstance => format!("instance resources exhausted ({})", reading),
    };
    Some(format!("{} [{}] {}", level, descriptor.name, detail))
}
