//! Mender resource monitoring
//!
//! Observes configured infrastructure resources and publishes their health:
//! - [`MetricAdapter`]: reads raw metrics for one resource kind
//! - [`thresholds::evaluate`]: maps metrics to a [`HealthStatus`](mender_types::HealthStatus)
//! - [`ResourceMonitor`]: background polling plus on-demand refresh
//! - [`LogWindow`]: bounded recent log entries behind the [`LogSource`] contract

pub mod adapter;
pub mod config;
pub mod error;
pub mod logs;
pub mod monitor;
pub mod thresholds;

pub use adapter::MetricAdapter;
pub use config::{Band, MonitorConfig, ThresholdConfig};
pub use error::{MonitorError, MonitorResult};
pub use logs::{LogQuery, LogSource, LogWindow};
pub use monitor::{MonitorEvent, ResourceMonitor};
pub use thresholds::{evaluate, keys};
