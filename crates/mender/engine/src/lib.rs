//! Mender fix engine
//!
//! The [`FixOrchestrator`] runs the detect, analyze, execute and verify
//! loop against a [`ResourceMonitor`](mender_monitor::ResourceMonitor), a
//! [`ToolRegistry`](mender_tools::ToolRegistry) and an
//! [`AnalysisClient`](mender_analysis::AnalysisClient), and records every
//! workflow in an [`EvaluationStore`].

pub mod error;
pub mod orchestrator;
pub mod store;

pub use error::{EngineError, EngineResult, StoreError, StoreResult};
pub use orchestrator::{FixOrchestrator, OrchestratorConfig, OrchestratorState, Phase};
pub use store::{EvaluationStore, InMemoryEvaluationStore};
