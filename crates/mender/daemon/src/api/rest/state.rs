//! Application state for API handlers

use std::sync::Arc;

use mender_engine::FixOrchestrator;

use crate::infrastructure::SimulatedInfrastructure;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Fix orchestrator, also the entry point to monitor, logs, tools,
    /// analysis history and the evaluation store
    pub orchestrator: Arc<FixOrchestrator>,

    /// Failure injection handle, present in simulated mode
    pub simulation: Option<Arc<SimulatedInfrastructure>>,

    /// Infrastructure backend name
    pub infrastructure: String,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        orchestrator: Arc<FixOrchestrator>,
        simulation: Option<Arc<SimulatedInfrastructure>>,
        infrastructure: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            simulation,
            infrastructure: infrastructure.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds();

        match secs {
            s if s < 60 => format!("{}s", s),
            s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
            s if s < 86400 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
            s => format!("{}d {}h", s / 86400, (s % 86400) / 3600),
        }
    }
}
