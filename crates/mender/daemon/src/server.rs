//! Server setup and lifecycle management

use std::sync::Arc;
use std::time::Duration;

use mender_analysis::{AnalysisClient, LlmProvider};
use mender_engine::FixOrchestrator;
use mender_monitor::{LogSource, LogWindow, MonitorEvent, ResourceMonitor};
use mender_tools::ToolRegistry;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult, StorageError};
use crate::infrastructure::Infrastructure;
use crate::{llm, storage};

/// Wired components shared by the API and background tasks
pub struct Components {
    pub state: AppState,
    pub logs: Arc<LogWindow>,
}

impl Components {
    /// Build every component from configuration with the given analysis provider
    pub async fn build(config: &DaemonConfig, provider: Arc<dyn LlmProvider>) -> DaemonResult<Self> {
        let logs = Arc::new(LogWindow::new(
            config.monitor.log_capacity,
            chrono::Duration::seconds(config.monitor.log_window_secs as i64),
        ));

        let infrastructure = Infrastructure::build(config, logs.clone())?;

        let monitor = Arc::new(
            ResourceMonitor::new(config.monitor.monitor_config(), config.descriptors())
                .with_adapter_for_all(infrastructure.metric_adapter()),
        );

        let tools = Arc::new(
            ToolRegistry::standard(infrastructure.tool_backend(), config.tools.clone())
                .with_timeout(config.orchestrator.tool_timeout()),
        );

        let analysis = Arc::new(AnalysisClient::new(
            provider,
            config.orchestrator.analysis_config(config.llm.history_limit),
        ));

        let store = storage::open(&config.storage).await?;

        let log_source: Arc<dyn LogSource> = logs.clone();
        let orchestrator = Arc::new(FixOrchestrator::new(
            config
                .orchestrator
                .orchestrator_config(config.application.clone()),
            monitor,
            log_source,
            tools,
            analysis,
            store,
        ));

        let sealed = orchestrator
            .seal_abandoned()
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;
        if sealed > 0 {
            tracing::warn!(sealed, "Sealed evaluations left unfinished by a previous run");
        }

        let state = AppState::new(orchestrator, infrastructure.simulation(), infrastructure.name());
        Ok(Self { state, logs })
    }
}

/// Mender daemon server
pub struct Server {
    config: DaemonConfig,
    components: Components,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let provider = llm::build_provider(&config.llm);
        let components = Components::build(&config, provider).await?;
        Ok(Self { config, components })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let state = self.components.state.clone();
        let monitor = state.orchestrator.monitor().clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor_task = tokio::spawn(monitor.clone().run(shutdown_rx.clone()));

        // The simulation writes its own log lines; a remote agent does not.
        let record = state.simulation.is_none();
        let events_task = tokio::spawn(watch_status_changes(
            monitor.subscribe(),
            self.components.logs.clone(),
            record,
            shutdown_rx,
        ));

        let app = create_router(
            state.clone(),
            self.config.server.enable_cors,
            Duration::from_secs(self.config.server.request_timeout_secs),
        );

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Mender daemon listening on {}", addr);
        tracing::info!(
            infrastructure = %state.infrastructure,
            resources = monitor.resources().len(),
            "Monitoring resources"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Mender daemon shutting down");

        let _ = shutdown_tx.send(true);
        let _ = monitor_task.await;
        let _ = events_task.await;

        if state.orchestrator.is_busy() {
            tracing::warn!(
                fix_id = ?state.orchestrator.state().fix_id,
                "Shutting down with a fix workflow in progress"
            );
        }

        Ok(())
    }
}

/// Log resource status transitions, optionally recording them in the log window
async fn watch_status_changes(
    mut events: broadcast::Receiver<MonitorEvent>,
    logs: Arc<LogWindow>,
    record: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(MonitorEvent::StatusChanged { resource_id, old_status, new_status }) => {
                    if new_status.is_unhealthy() {
                        tracing::warn!(resource_id = %resource_id, from = %old_status, to = %new_status, "Resource status changed");
                    } else {
                        tracing::info!(resource_id = %resource_id, from = %old_status, to = %new_status, "Resource status changed");
                    }
                    if record {
                        let level = match new_status {
                            s if s.is_unhealthy() => "ERROR",
                            _ => "INFO",
                        };
                        logs.record_message(
                            resource_id.clone(),
                            format!("{} resource {} status {} -> {}", level, resource_id, old_status, new_status),
                        );
                    }
                }
                Ok(MonitorEvent::PollCompleted { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Status watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
