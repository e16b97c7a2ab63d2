//! Infrastructure access for metrics and tool operations

mod agent;
mod simulated;

use std::sync::Arc;
use std::time::Duration;

use mender_monitor::{LogWindow, MetricAdapter};
use mender_tools::ToolBackend;

use crate::config::{DaemonConfig, InfrastructureConfig};
use crate::error::{DaemonError, DaemonResult};

pub use agent::AgentClient;
pub use simulated::{baseline, SimulatedInfrastructure};

/// The backend serving both metric reads and tool operations.
#[derive(Clone)]
pub enum Infrastructure {
    Simulated(Arc<SimulatedInfrastructure>),
    Agent(Arc<AgentClient>),
}

impl Infrastructure {
    pub fn build(config: &DaemonConfig, logs: Arc<LogWindow>) -> DaemonResult<Self> {
        match &config.infrastructure {
            InfrastructureConfig::Simulated => Ok(Infrastructure::Simulated(Arc::new(
                SimulatedInfrastructure::new(
                    config.descriptors(),
                    logs,
                    config.monitor.thresholds.clone(),
                ),
            ))),
            InfrastructureConfig::Http {
                base_url,
                timeout_secs,
            } => {
                let client = AgentClient::new(base_url.as_str(), Duration::from_secs(*timeout_secs))
                    .map_err(|e| DaemonError::Config(format!("agent client: {}", e)))?;
                Ok(Infrastructure::Agent(Arc::new(client)))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Infrastructure::Simulated(_) => "simulated",
            Infrastructure::Agent(_) => "agent",
        }
    }

    pub fn metric_adapter(&self) -> Arc<dyn MetricAdapter> {
        match self {
            Infrastructure::Simulated(sim) => sim.clone(),
            Infrastructure::Agent(agent) => agent.clone(),
        }
    }

    pub fn tool_backend(&self) -> Arc<dyn ToolBackend> {
        match self {
            Infrastructure::Simulated(sim) => sim.clone(),
            Infrastructure::Agent(agent) => agent.clone(),
        }
    }

    /// Failure injection handle, present only in simulated mode.
    pub fn simulation(&self) -> Option<Arc<SimulatedInfrastructure>> {
        match self {
            Infrastructure::Simulated(sim) => Some(sim.clone()),
            Infrastructure::Agent(_) => None,
        }
    }
}
