//! Metric to health status mapping.
//!
//! [`evaluate`] is total and deterministic: the same kind and metrics always
//! yield the same status, and a metric set that lacks the keys a rule needs
//! (or carries non-finite values) yields [`HealthStatus::Unknown`].

use mender_types::{HealthStatus, MetricMap, ResourceKind};

use crate::config::{Band, ThresholdConfig};

/// Well-known metric names read by the threshold rules.
pub mod keys {
    pub const MEMORY_USAGE_PERCENT: &str = "memory_usage_percent";
    pub const REDIS_MEMORY_USAGE_PERCENT: &str = "redis_memory_usage_percent";
    pub const CONNECTION_USAGE_PERCENT: &str = "connection_usage_percent";
    pub const TOTAL_CONNECTIONS: &str = "total_connections";
    pub const MAX_CONNECTIONS: &str = "max_connections";
    pub const ACTIVE_CONNECTIONS: &str = "active_connections";
    pub const WORKER_CONNECTIONS: &str = "worker_connections";
    pub const RUNNING: &str = "running";
    pub const CPU_USAGE_PERCENT: &str = "cpu_usage_percent";
    pub const DISK_USAGE_PERCENT: &str = "disk_usage_percent";
}

/// Compute the health status for a resource kind from its metrics.
pub fn evaluate(kind: ResourceKind, metrics: &MetricMap, thresholds: &ThresholdConfig) -> HealthStatus {
    let status = match kind {
        ResourceKind::Cache => cache(metrics, thresholds),
        ResourceKind::RelationalDb => relational_db(metrics, thresholds),
        ResourceKind::Proxy => proxy(metrics, thresholds),
        ResourceKind::Container => container(metrics, thresholds),
        ResourceKind::CloudInstance => cloud_instance(metrics, thresholds),
    };
    status.unwrap_or(HealthStatus::Unknown)
}

/// The percentage a rule is judged on, when it can be computed.
pub fn primary_reading(kind: ResourceKind, metrics: &MetricMap) -> Option<(&'static str, f64)> {
    match kind {
        ResourceKind::Cache => memory_percent(metrics).map(|v| ("memory", v)),
        ResourceKind::RelationalDb => finite(metrics, keys::CONNECTION_USAGE_PERCENT)
            .or_else(|| ratio_percent(metrics, keys::TOTAL_CONNECTIONS, keys::MAX_CONNECTIONS))
            .map(|v| ("connections", v)),
        ResourceKind::Proxy => {
            ratio_percent(metrics, keys::ACTIVE_CONNECTIONS, keys::WORKER_CONNECTIONS)
                .or_else(|| finite(metrics, keys::CONNECTION_USAGE_PERCENT))
                .map(|v| ("connections", v))
        }
        ResourceKind::Container => {
            finite(metrics, keys::MEMORY_USAGE_PERCENT).map(|v| ("memory", v))
        }
        ResourceKind::CloudInstance => [
            ("cpu", keys::CPU_USAGE_PERCENT),
            ("memory", keys::MEMORY_USAGE_PERCENT),
            ("disk", keys::DISK_USAGE_PERCENT),
        ]
        .into_iter()
        .filter_map(|(label, key)| finite(metrics, key).map(|v| (label, v)))
        .max_by(|a, b| a.1.total_cmp(&b.1)),
    }
}

fn cache(metrics: &MetricMap, t: &ThresholdConfig) -> Option<HealthStatus> {
    memory_percent(metrics).map(|v| t.cache_memory.classify(v))
}

fn relational_db(metrics: &MetricMap, t: &ThresholdConfig) -> Option<HealthStatus> {
    primary_reading(ResourceKind::RelationalDb, metrics).map(|(_, v)| t.db_connections.classify(v))
}

fn proxy(metrics: &MetricMap, t: &ThresholdConfig) -> Option<HealthStatus> {
    primary_reading(ResourceKind::Proxy, metrics).map(|(_, v)| t.proxy_connections.classify(v))
}

fn container(metrics: &MetricMap, t: &ThresholdConfig) -> Option<HealthStatus> {
    if finite(metrics, keys::RUNNING) == Some(0.0) {
        return Some(HealthStatus::Failed);
    }
    finite(metrics, keys::MEMORY_USAGE_PERCENT).map(|v| t.container_memory.classify(v))
}

fn cloud_instance(metrics: &MetricMap, t: &ThresholdConfig) -> Option<HealthStatus> {
    let readings: [(&str, &Band); 3] = [
        (keys::CPU_USAGE_PERCENT, &t.cloud_cpu),
        (keys::MEMORY_USAGE_PERCENT, &t.cloud_memory),
        (keys::DISK_USAGE_PERCENT, &t.cloud_disk),
    ];

    readings
        .iter()
        .filter_map(|(key, band)| finite(metrics, key).map(|v| band.classify(v)))
        .reduce(worst)
}

fn memory_percent(metrics: &MetricMap) -> Option<f64> {
    finite(metrics, keys::MEMORY_USAGE_PERCENT)
        .or_else(|| finite(metrics, keys::REDIS_MEMORY_USAGE_PERCENT))
}

fn ratio_percent(metrics: &MetricMap, used: &str, capacity: &str) -> Option<f64> {
    let used = finite(metrics, used)?;
    let capacity = finite(metrics, capacity).filter(|c| *c > 0.0)?;
    Some(used / capacity * 100.0)
}

fn finite(metrics: &MetricMap, key: &str) -> Option<f64> {
    metrics.get(key).copied().filter(|v| v.is_finite())
}

fn worst(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    fn rank(s: HealthStatus) -> u8 {
        match s {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Failed => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> MetricMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn eval(kind: ResourceKind, pairs: &[(&str, f64)]) -> HealthStatus {
        evaluate(kind, &metrics(pairs), &ThresholdConfig::default())
    }

    #[test]
    fn test_cache_memory() {
        assert_eq!(eval(ResourceKind::Cache, &[("memory_usage_percent", 96.0)]), HealthStatus::Failed);
        assert_eq!(eval(ResourceKind::Cache, &[("memory_usage_percent", 92.0)]), HealthStatus::Degraded);
        assert_eq!(eval(ResourceKind::Cache, &[("memory_usage_percent", 10.0)]), HealthStatus::Healthy);
        assert_eq!(
            eval(ResourceKind::Cache, &[("redis_memory_usage_percent", 97.0)]),
            HealthStatus::Failed
        );
    }

    #[test]
    fn test_db_connection_usage() {
        assert_eq!(
            eval(ResourceKind::RelationalDb, &[("connection_usage_percent", 92.0)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            eval(ResourceKind::RelationalDb, &[("total_connections", 97.0), ("max_connections", 100.0)]),
            HealthStatus::Failed
        );
        assert_eq!(
            eval(ResourceKind::RelationalDb, &[("total_connections", 20.0), ("max_connections", 100.0)]),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_db_reported_usage_wins_over_counts() {
        let input = metrics(&[
            ("connection_usage_percent", 92.0),
            ("total_connections", 10.0),
            ("max_connections", 100.0),
        ]);
        assert_eq!(
            primary_reading(ResourceKind::RelationalDb, &input),
            Some(("connections", 92.0))
        );
        assert_eq!(
            evaluate(ResourceKind::RelationalDb, &input, &ThresholdConfig::default()),
            HealthStatus::Degraded
        );
        assert_eq!(
            eval(ResourceKind::RelationalDb, &[("connection_usage_percent", 96.0)]),
            HealthStatus::Failed
        );
    }

    #[test]
    fn test_proxy_ratio() {
        assert_eq!(
            eval(ResourceKind::Proxy, &[("active_connections", 85.0), ("worker_connections", 100.0)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            eval(ResourceKind::Proxy, &[("active_connections", 5.0), ("worker_connections", 0.0)]),
            HealthStatus::Unknown
        );
    }

    #[test]
    fn test_container_stopped_is_failed() {
        assert_eq!(eval(ResourceKind::Container, &[("running", 0.0)]), HealthStatus::Failed);
        assert_eq!(
            eval(ResourceKind::Container, &[("running", 1.0), ("memory_usage_percent", 40.0)]),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_cloud_instance_takes_worst_dimension() {
        assert_eq!(
            eval(
                ResourceKind::CloudInstance,
                &[("cpu_usage_percent", 20.0), ("disk_usage_percent", 96.0)]
            ),
            HealthStatus::Degraded
        );
        assert_eq!(
            eval(ResourceKind::CloudInstance, &[("memory_usage_percent", 99.0)]),
            HealthStatus::Failed
        );
    }

    #[test]
    fn test_missing_or_invalid_metrics_are_unknown() {
        for kind in ResourceKind::ALL {
            assert_eq!(eval(kind, &[]), HealthStatus::Unknown, "kind {}", kind);
            assert_eq!(eval(kind, &[("unrelated", 1.0)]), HealthStatus::Unknown, "kind {}", kind);
        }
        assert_eq!(
            eval(ResourceKind::Cache, &[("memory_usage_percent", f64::NAN)]),
            HealthStatus::Unknown
        );
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let input = metrics(&[("total_connections", 81.0), ("max_connections", 100.0)]);
        let thresholds = ThresholdConfig::default();
        let first = evaluate(ResourceKind::RelationalDb, &input, &thresholds);
        for _ in 0..10 {
            assert_eq!(evaluate(ResourceKind::RelationalDb, &input, &thresholds), first);
        }
    }

    #[test]
    fn test_primary_reading() {
        let input = metrics(&[("cpu_usage_percent", 40.0), ("memory_usage_percent", 70.0)]);
        assert_eq!(
            primary_reading(ResourceKind::CloudInstance, &input),
            Some(("memory", 70.0))
        );
    }
}
