//! Mender daemon library
//!
//! This module provides the core components for the Mender daemon:
//! - REST API handlers
//! - Evaluation storage backends
//! - Simulated and agent-backed infrastructure
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod llm;
pub mod server;
pub mod storage;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, StorageError};
pub use infrastructure::{AgentClient, Infrastructure, SimulatedInfrastructure};
pub use server::{Components, Server};
