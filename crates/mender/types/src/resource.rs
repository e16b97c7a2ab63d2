//! Resource status model
//!
//! A [`ResourceStatus`] is the monitor's view of one resource at one point in
//! time. Snapshots are replaced wholesale on every poll and never patched.

use crate::ids::ResourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric name to numeric reading.
pub type MetricMap = BTreeMap<String, f64>;

/// Kind of monitored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Key-value cache (redis, managed memorystore).
    Cache,
    /// Relational database (postgres, managed SQL).
    RelationalDb,
    /// Reverse proxy (nginx).
    Proxy,
    /// Application container.
    Container,
    /// Cloud compute instance.
    CloudInstance,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Cache,
        ResourceKind::RelationalDb,
        ResourceKind::Proxy,
        ResourceKind::Container,
        ResourceKind::CloudInstance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cache => "cache",
            ResourceKind::RelationalDb => "relational_db",
            ResourceKind::Proxy => "proxy",
            ResourceKind::Container => "container",
            ResourceKind::CloudInstance => "cloud_instance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a resource as computed from its metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Failed,
    Unknown,
}

impl HealthStatus {
    /// Degraded and failed resources are the ones a fix must address.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Degraded | HealthStatus::Failed)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Failed => write!(f, "FAILED"),
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Static description of a monitored resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Stable identifier.
    pub id: ResourceId,

    /// Human readable name.
    pub name: String,

    /// Resource kind, selects the metric adapter and threshold rule.
    pub kind: ResourceKind,

    /// Adapter-specific address: container name, instance name or instance id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: ResourceId::new(id),
            name: name.into(),
            kind,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// The address adapters should use, falling back to the resource id.
    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Snapshot of one resource's health and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
    pub status: HealthStatus,
    #[serde(default)]
    pub metrics: MetricMap,
    pub last_updated: DateTime<Utc>,

    /// Why the status is unknown, when the adapter could not be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceStatus {
    /// Snapshot built from a successful metric read.
    pub fn observed(descriptor: &ResourceDescriptor, status: HealthStatus, metrics: MetricMap) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            status,
            metrics,
            last_updated: Utc::now(),
            error: None,
        }
    }

    /// Snapshot for a resource whose metrics could not be read this cycle.
    pub fn unknown(descriptor: &ResourceDescriptor, reason: impl Into<String>) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            status: HealthStatus::Unknown,
            metrics: MetricMap::new(),
            last_updated: Utc::now(),
            error: Some(reason.into()),
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.status.is_unhealthy()
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Short `name=value` rendering of the metrics, used in reasons and prompts.
    pub fn metrics_summary(&self) -> String {
        self.metrics
            .iter()
            .map(|(k, v)| format!("{}={}", k, format_metric(*v)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhealthy_statuses() {
        assert!(HealthStatus::Degraded.is_unhealthy());
        assert!(HealthStatus::Failed.is_unhealthy());
        assert!(!HealthStatus::Healthy.is_unhealthy());
        assert!(!HealthStatus::Unknown.is_unhealthy());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"DEGRADED\"");
    }

    #[test]
    fn test_descriptor_target_fallback() {
        let plain = ResourceDescriptor::new("cache-1", "redis", ResourceKind::Cache);
        assert_eq!(plain.target(), "cache-1");

        let targeted = plain.with_target("redis");
        assert_eq!(targeted.target(), "redis");
    }

    #[test]
    fn test_metrics_summary() {
        let descriptor = ResourceDescriptor::new("cache-1", "redis", ResourceKind::Cache);
        let mut metrics = MetricMap::new();
        metrics.insert("memory_usage_percent".to_string(), 91.0);
        metrics.insert("hit_rate".to_string(), 0.75);
        let status = ResourceStatus::observed(&descriptor, HealthStatus::Degraded, metrics);
        assert_eq!(status.metrics_summary(), "hit_rate=0.8, memory_usage_percent=91");
    }
}
