//! Metric adapter contract.

use async_trait::async_trait;
use mender_types::{MetricMap, ResourceDescriptor};

use crate::error::MonitorResult;

/// Reads raw metrics for one resource.
///
/// Implementations talk to a runtime or cloud API and translate its answer
/// into a flat metric map. They may fail with
/// [`MonitorError::AdapterUnavailable`](crate::MonitorError::AdapterUnavailable).
#[async_trait]
pub trait MetricAdapter: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Read the current metrics of `resource`.
    async fn read_metrics(&self, resource: &ResourceDescriptor) -> MonitorResult<MetricMap>;
}
