//! Resource monitor.
//!
//! The monitor owns the current [`ResourceStatus`] of every configured
//! resource. A background loop polls all metric adapters on a fixed interval;
//! callers that need up-to-date data (verification after a fix) can refresh
//! resources on demand. Snapshots are always replaced wholesale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mender_types::{HealthStatus, ResourceDescriptor, ResourceId, ResourceKind, ResourceStatus};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::adapter::MetricAdapter;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::thresholds;

/// Events emitted by the resource monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A resource's status changed between two observations.
    StatusChanged {
        resource_id: ResourceId,
        old_status: HealthStatus,
        new_status: HealthStatus,
    },

    /// A background poll finished.
    PollCompleted { resources: usize, unhealthy: usize },
}

/// Periodic and on-demand health observation of configured resources.
pub struct ResourceMonitor {
    /// Configuration.
    config: MonitorConfig,

    /// Configured resources, in display order.
    resources: Vec<ResourceDescriptor>,

    /// Metric adapters by resource kind.
    adapters: HashMap<ResourceKind, Arc<dyn MetricAdapter>>,

    /// Latest published snapshot per resource.
    snapshots: DashMap<ResourceId, ResourceStatus>,

    /// Event broadcaster.
    event_tx: broadcast::Sender<MonitorEvent>,

    /// Set while a background poll is running.
    polling: AtomicBool,
}

impl ResourceMonitor {
    /// Create a monitor for `resources`. Every resource starts as unknown.
    pub fn new(config: MonitorConfig, resources: Vec<ResourceDescriptor>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let snapshots = DashMap::new();
        for descriptor in &resources {
            snapshots.insert(
                descriptor.id.clone(),
                ResourceStatus::unknown(descriptor, "not polled yet"),
            );
        }

        Self {
            config,
            resources,
            adapters: HashMap::new(),
            snapshots,
            event_tx,
            polling: AtomicBool::new(false),
        }
    }

    /// Register the metric adapter for a resource kind.
    pub fn with_adapter(mut self, kind: ResourceKind, adapter: Arc<dyn MetricAdapter>) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    /// Register one adapter for every resource kind.
    pub fn with_adapter_for_all(mut self, adapter: Arc<dyn MetricAdapter>) -> Self {
        for kind in ResourceKind::ALL {
            self.adapters.insert(kind, adapter.clone());
        }
        self
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Configured resources.
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn descriptor(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| &r.id == id)
    }

    /// Latest published snapshot of one resource.
    pub fn snapshot(&self, id: &ResourceId) -> Option<ResourceStatus> {
        self.snapshots.get(id).map(|s| s.value().clone())
    }

    /// Latest published snapshots of all resources, in configuration order.
    pub fn snapshot_all(&self) -> Vec<ResourceStatus> {
        self.resources
            .iter()
            .filter_map(|r| self.snapshot(&r.id))
            .collect()
    }

    /// Re-read one resource now, bypassing the polling cadence.
    pub async fn refresh(&self, id: &ResourceId) -> MonitorResult<ResourceStatus> {
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| MonitorError::ResourceNotFound(id.clone()))?;
        let status = self.observe(descriptor).await;
        self.publish(status.clone());
        Ok(status)
    }

    /// Re-read the given resources now. Unknown ids are skipped.
    pub async fn refresh_many(&self, ids: &[ResourceId]) -> Vec<ResourceStatus> {
        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            match self.refresh(id).await {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(resource_id = %id, error = %e, "Skipping refresh"),
            }
        }
        statuses
    }

    /// Re-read every configured resource now.
    pub async fn refresh_all(&self) -> Vec<ResourceStatus> {
        let ids: Vec<ResourceId> = self.resources.iter().map(|r| r.id.clone()).collect();
        self.refresh_many(&ids).await
    }

    /// Run one polling cycle. Returns `false` if a cycle was already running.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> bool {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous poll still running, skipping tick");
            return false;
        }
        let _guard = PollGuard(&self.polling);

        let statuses = self.refresh_all().await;
        let unhealthy = statuses.iter().filter(|s| s.is_unhealthy()).count();
        let _ = self.event_tx.send(MonitorEvent::PollCompleted {
            resources: statuses.len(),
            unhealthy,
        });
        debug!(resources = statuses.len(), unhealthy, "Poll completed");
        true
    }

    /// Poll on the configured interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            resources = self.resources.len(),
            "Resource monitor started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Resource monitor stopped");
    }

    /// Read and classify one resource. Adapter errors and timeouts yield UNKNOWN.
    async fn observe(&self, descriptor: &ResourceDescriptor) -> ResourceStatus {
        let adapter = match self.adapters.get(&descriptor.kind) {
            Some(adapter) => adapter,
            None => {
                let e = MonitorError::NoAdapter(descriptor.kind);
                warn!(resource_id = %descriptor.id, error = %e, "Metric read failed");
                return ResourceStatus::unknown(descriptor, e.to_string());
            }
        };

        let timeout = self.config.adapter_timeout;
        let read = tokio::time::timeout(timeout, adapter.read_metrics(descriptor)).await;

        let result = match read {
            Ok(result) => result,
            Err(_) => Err(MonitorError::AdapterTimeout {
                resource_id: descriptor.id.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(metrics) => {
                let status = thresholds::evaluate(descriptor.kind, &metrics, &self.config.thresholds);
                ResourceStatus::observed(descriptor, status, metrics)
            }
            Err(e) => {
                warn!(
                    resource_id = %descriptor.id,
                    adapter = adapter.name(),
                    error = %e,
                    "Metric read failed"
                );
                ResourceStatus::unknown(descriptor, e.to_string())
            }
        }
    }

    fn publish(&self, status: ResourceStatus) {
        let new_status = status.status;
        let resource_id = status.id.clone();
        let old = self.snapshots.insert(resource_id.clone(), status);

        if let Some(old) = old {
            if old.status != new_status && old.error.as_deref() != Some("not polled yet") {
                info!(
                    resource_id = %resource_id,
                    old_status = %old.status,
                    new_status = %new_status,
                    "Resource status changed"
                );
                let _ = self.event_tx.send(MonitorEvent::StatusChanged {
                    resource_id,
                    old_status: old.status,
                    new_status,
                });
            }
        }
    }
}

/// Clears the polling flag however the cycle ends, including cancellation.
struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
