//! Monitor configuration.
//!
//! Defines polling cadence, adapter timeouts and the per-kind thresholds that
//! map metrics to a health status. All percentages are on a 0-100 scale.

use std::time::Duration;

use mender_types::HealthStatus;
use serde::{Deserialize, Serialize};

/// Configuration for the resource monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between background polls.
    pub poll_interval: Duration,

    /// Maximum time a metric adapter may take for one resource.
    pub adapter_timeout: Duration,

    /// Health thresholds.
    pub thresholds: ThresholdConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            adapter_timeout: Duration::from_secs(5),
            thresholds: ThresholdConfig::default(),
        }
    }
}

/// Degraded/failed cut-offs for one metric. Values strictly above a cut-off trip it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub degraded_above: f64,
    pub failed_above: f64,
}

impl Band {
    pub const fn new(degraded_above: f64, failed_above: f64) -> Self {
        Self {
            degraded_above,
            failed_above,
        }
    }

    pub fn classify(&self, value: f64) -> HealthStatus {
        if value > self.failed_above {
            HealthStatus::Failed
        } else if value > self.degraded_above {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Thresholds for every resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Cache memory usage percent.
    pub cache_memory: Band,

    /// Relational database connection usage percent.
    pub db_connections: Band,

    /// Proxy active/worker connection percent.
    pub proxy_connections: Band,

    /// Container memory usage percent.
    pub container_memory: Band,

    /// Cloud instance CPU percent.
    pub cloud_cpu: Band,

    /// Cloud instance memory percent.
    pub cloud_memory: Band,

    /// Cloud instance disk percent.
    pub cloud_disk: Band,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cache_memory: Band::new(90.0, 95.0),
            db_connections: Band::new(80.0, 95.0),
            proxy_connections: Band::new(80.0, 95.0),
            container_memory: Band::new(90.0, 98.0),
            cloud_cpu: Band::new(90.0, 95.0),
            cloud_memory: Band::new(90.0, 95.0),
            cloud_disk: Band::new(95.0, 98.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries_are_exclusive() {
        let band = Band::new(80.0, 95.0);
        assert_eq!(band.classify(80.0), HealthStatus::Healthy);
        assert_eq!(band.classify(80.1), HealthStatus::Degraded);
        assert_eq!(band.classify(95.0), HealthStatus::Degraded);
        assert_eq!(band.classify(95.1), HealthStatus::Failed);
    }
}
