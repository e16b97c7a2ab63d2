//! Fix orchestrator: drives one workflow at a time through
//! detect, analyze, execute and verify, retrying with feedback.
//!
//! The orchestrator owns a single workflow slot. A trigger that arrives
//! while another workflow holds the slot is rejected with
//! [`EngineError::FixInProgress`] and creates no evaluation.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mender_analysis::AnalysisClient;
use mender_monitor::thresholds::primary_reading;
use mender_monitor::{LogSource, ResourceMonitor};
use mender_tools::ToolRegistry;
use mender_types::{
    AttemptError, ErrorKind, EvaluationFilter, ExecutionStatus, FailedResource, FailureContext,
    FinalStatus, FixAttempt, FixEvaluation, FixId, FixPlan, HealthStatus, InteractionId,
    PreviousAttempt, ResourceId, ResourceStatus, TimeRange, ToolDescriptor, ToolResult,
    TriggerRequest,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{EngineError, EngineResult, StoreError};
use crate::store::EvaluationStore;

/// Workflow phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Detecting,
    Analyzing,
    Executing,
    Verifying,
    DoneSuccess,
    DoneFailed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Idle | Phase::DoneSuccess | Phase::DoneFailed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "IDLE",
            Phase::Detecting => "DETECTING",
            Phase::Analyzing => "ANALYZING",
            Phase::Executing => "EXECUTING",
            Phase::Verifying => "VERIFYING",
            Phase::DoneSuccess => "DONE_SUCCESS",
            Phase::DoneFailed => "DONE_FAILED",
        };
        f.write_str(name)
    }
}

/// Observable orchestrator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub phase: Phase,
    /// Evaluation of the current or most recent workflow.
    pub fix_id: Option<FixId>,
    /// Attempt in progress, 0 before the first analysis.
    pub attempt: u32,
    pub in_flight: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            fix_id: None,
            attempt: 0,
            in_flight: false,
            updated_at: Utc::now(),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attempts after the first. A workflow runs at most `max_retries + 1` attempts.
    pub max_retries: u32,

    /// Wait between the last tool call and the verification snapshot.
    pub settle_delay: Duration,

    /// Wait between an unresolved attempt and the next detection.
    pub retry_delay: Duration,

    /// Log window used when a trigger does not name one.
    pub default_time_range: String,

    /// Static application description forwarded to the analysis prompt.
    pub application: serde_json::Value,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            settle_delay: Duration::from_secs(2),
            retry_delay: Duration::from_secs(3),
            default_time_range: "1h".to_string(),
            application: serde_json::Value::Null,
        }
    }
}

/// Deadline expired while a bounded step was in flight.
struct Expired;

async fn bounded<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, Expired> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| Expired),
        None => Ok(fut.await),
    }
}

/// Marks the workflow finished when dropped, whatever path ended it.
struct PhaseGuard {
    state: Arc<watch::Sender<OrchestratorState>>,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.state.send_modify(|s| {
            s.in_flight = false;
            if !s.phase.is_terminal() {
                s.phase = Phase::DoneFailed;
            }
            s.updated_at = Utc::now();
        });
    }
}

/// A workflow that holds the slot and has a stored evaluation.
struct Workflow {
    fix_id: FixId,
    scope: Vec<ResourceId>,
    time_range: String,
    context: FailureContext,
    deadline: Option<Instant>,
    // Field order matters: the phase is finalized before the slot is released.
    _phase: PhaseGuard,
    _slot: OwnedMutexGuard<()>,
}

enum AttemptOutcome {
    Resolved,
    Unresolved(PreviousAttempt),
    Aborted,
}

/// Single-flight fix workflow driver.
pub struct FixOrchestrator {
    config: OrchestratorConfig,
    monitor: Arc<ResourceMonitor>,
    logs: Arc<dyn LogSource>,
    tools: Arc<ToolRegistry>,
    analysis: Arc<AnalysisClient>,
    store: Arc<dyn EvaluationStore>,
    slot: Arc<Mutex<()>>,
    state: Arc<watch::Sender<OrchestratorState>>,
}

impl FixOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        monitor: Arc<ResourceMonitor>,
        logs: Arc<dyn LogSource>,
        tools: Arc<ToolRegistry>,
        analysis: Arc<AnalysisClient>,
        store: Arc<dyn EvaluationStore>,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState::default());
        Self {
            config,
            monitor,
            logs,
            tools,
            analysis,
            store,
            slot: Arc::new(Mutex::new(())),
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    pub fn logs(&self) -> &Arc<dyn LogSource> {
        &self.logs
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn analysis(&self) -> &Arc<AnalysisClient> {
        &self.analysis
    }

    pub fn store(&self) -> &Arc<dyn EvaluationStore> {
        &self.store
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().in_flight
    }

    /// Run a workflow to completion and return the sealed evaluation.
    pub async fn trigger(&self, request: TriggerRequest) -> EngineResult<FixEvaluation> {
        let workflow = self.begin(request, None).await?;
        self.drive(workflow).await
    }

    /// Like [`trigger`](Self::trigger), but analysis and tool calls still
    /// running after `timeout` are cancelled and the workflow is sealed failed.
    pub async fn trigger_with_deadline(
        &self,
        request: TriggerRequest,
        timeout: Duration,
    ) -> EngineResult<FixEvaluation> {
        let workflow = self.begin(request, Some(Instant::now() + timeout)).await?;
        self.drive(workflow).await
    }

    /// Seal evaluations left unsealed by a previous process as failed.
    /// Returns how many were sealed.
    pub async fn seal_abandoned(&self) -> EngineResult<usize> {
        let _slot = self.acquire_slot()?;
        let filter = EvaluationFilter {
            limit: usize::MAX,
            status: Some(ExecutionStatus::InProgress),
        };

        let abandoned = self.store.list(filter).await?;
        for evaluation in &abandoned {
            self.store.seal(evaluation.id(), FinalStatus::Failed).await?;
            warn!(fix_id = %evaluation.id(), "Sealed evaluation abandoned by a previous run");
        }
        Ok(abandoned.len())
    }

    /// Delete every stored evaluation while holding the workflow slot, so no
    /// trigger can start in between.
    pub async fn delete_all(&self) -> EngineResult<u64> {
        let _slot = self.acquire_slot()?;
        let deleted = self.store.delete_all().await?;
        info!(deleted, "Deleted all evaluations");
        Ok(deleted)
    }

    /// Capture the failure context, store the evaluation, and finish the
    /// workflow in the background. Returns once the evaluation exists.
    pub async fn start(
        self: &Arc<Self>,
        request: TriggerRequest,
        timeout: Option<Duration>,
    ) -> EngineResult<FixId> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let workflow = self.begin(request, deadline).await?;
        let fix_id = workflow.fix_id.clone();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.drive(workflow).await {
                error!(error = %e, "Fix workflow aborted");
            }
        });

        Ok(fix_id)
    }

    async fn begin(
        &self,
        request: TriggerRequest,
        deadline: Option<Instant>,
    ) -> EngineResult<Workflow> {
        let slot = self.acquire_slot()?;

        self.state.send_modify(|s| {
            s.phase = Phase::Detecting;
            s.fix_id = None;
            s.attempt = 0;
            s.in_flight = true;
            s.updated_at = Utc::now();
        });
        let phase = PhaseGuard {
            state: Arc::clone(&self.state),
        };

        let scope = self.scope(&request);
        let time_range = request
            .time_range
            .clone()
            .unwrap_or_else(|| self.config.default_time_range.clone());
        let context = self.capture(&scope, &time_range).await;

        let fix_id = self.store.create(request, context.clone()).await?;
        self.state.send_modify(|s| s.fix_id = Some(fix_id.clone()));

        info!(
            fix_id = %fix_id,
            resources = context.resources.len(),
            unhealthy = context.unhealthy().count(),
            logs = context.logs.len(),
            "Fix workflow started"
        );

        Ok(Workflow {
            fix_id,
            scope,
            time_range,
            context,
            deadline,
            _phase: phase,
            _slot: slot,
        })
    }

    #[instrument(skip(self, workflow), fields(fix_id = %workflow.fix_id))]
    async fn drive(&self, workflow: Workflow) -> EngineResult<FixEvaluation> {
        match self.run(&workflow).await {
            Ok(evaluation) => Ok(evaluation),
            Err(e) => {
                error!(error = %e, "Fix workflow interrupted, sealing as failed");
                if let Err(seal_error) = self.store.seal(&workflow.fix_id, FinalStatus::Failed).await {
                    warn!(error = %seal_error, "Could not seal interrupted evaluation");
                }
                self.set_phase(Phase::DoneFailed);
                Err(e)
            }
        }
    }

    async fn run(&self, workflow: &Workflow) -> EngineResult<FixEvaluation> {
        if workflow.context.is_failure_free() {
            info!("No unhealthy resources, nothing to fix");
            return self.finish(&workflow.fix_id, FinalStatus::NoActionNeeded).await;
        }

        let catalog = self.tools.list();
        let mut current = workflow.context.clone();

        for attempt_number in 1..=self.config.max_retries + 1 {
            match self
                .attempt(workflow, attempt_number, &current, &catalog)
                .await?
            {
                AttemptOutcome::Resolved => {
                    return self.finish(&workflow.fix_id, FinalStatus::Success).await;
                }
                AttemptOutcome::Aborted => {
                    return self.finish(&workflow.fix_id, FinalStatus::Failed).await;
                }
                AttemptOutcome::Unresolved(previous) => {
                    if attempt_number > self.config.max_retries {
                        break;
                    }
                    warn!(
                        attempt = attempt_number,
                        still_failing = previous.failed_resources.len(),
                        "Attempt did not resolve the issue, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    self.set_phase(Phase::Detecting);
                    current = self
                        .capture(&workflow.scope, &workflow.time_range)
                        .await
                        .with_previous_attempt(previous);
                }
            }
        }

        self.finish(&workflow.fix_id, FinalStatus::FailedAfterRetries).await
    }

    async fn attempt(
        &self,
        workflow: &Workflow,
        attempt_number: u32,
        context: &FailureContext,
        catalog: &[ToolDescriptor],
    ) -> EngineResult<AttemptOutcome> {
        let started_at = Utc::now();
        let before = context.resources.clone();
        self.state.send_modify(|s| {
            s.phase = Phase::Analyzing;
            s.attempt = attempt_number;
            s.updated_at = Utc::now();
        });
        info!(attempt = attempt_number, "Analyzing failure");

        let record = |plan: Option<FixPlan>,
                      tool_results: Vec<ToolResult>,
                      interaction_id: Option<InteractionId>,
                      error: AttemptError| FixAttempt {
            attempt_number,
            fix_plan: plan,
            tool_results,
            before: before.clone(),
            after: Vec::new(),
            execution_status: ExecutionStatus::Failed,
            issues_resolved: false,
            failed_resources: Vec::new(),
            interaction_id,
            error: Some(error),
            started_at,
            finished_at: Utc::now(),
        };

        let analysis = match self
            .analysis
            .analyze_until(context, catalog, workflow.deadline)
            .await
        {
            Ok(analysis) => analysis,
            Err(e) if e.is_cancelled() => {
                warn!(attempt = attempt_number, interaction_id = %e.interaction_id(), "Deadline expired during analysis");
                let attempt = record(
                    None,
                    Vec::new(),
                    Some(e.interaction_id().clone()),
                    AttemptError::new(ErrorKind::Cancelled, "deadline expired during analysis"),
                );
                self.store.append_attempt(&workflow.fix_id, attempt).await?;
                return Ok(AttemptOutcome::Aborted);
            }
            Err(e) => {
                error!(attempt = attempt_number, error = %e, "Analysis failed");
                let attempt = record(
                    None,
                    Vec::new(),
                    Some(e.interaction_id().clone()),
                    AttemptError::new(ErrorKind::AnalysisError, e.to_string()),
                );
                self.store.append_attempt(&workflow.fix_id, attempt).await?;
                return Ok(AttemptOutcome::Aborted);
            }
        };

        info!(
            attempt = attempt_number,
            root_cause = %analysis.plan.root_cause,
            steps = analysis.plan.steps.len(),
            "Executing fix plan"
        );
        self.set_phase(Phase::Executing);

        let mut tool_results = Vec::with_capacity(analysis.plan.steps.len());
        for (index, step) in analysis.plan.steps.iter().enumerate() {
            let call = self.tools.execute(&step.tool_name, &step.parameters);
            match bounded(workflow.deadline, call).await {
                Ok(result) => {
                    if result.success {
                        info!(step = index + 1, tool = %step.tool_name, "Tool succeeded");
                    } else {
                        warn!(step = index + 1, tool = %step.tool_name, message = %result.message, "Tool failed");
                    }
                    tool_results.push(result);
                }
                Err(Expired) => {
                    warn!(step = index + 1, tool = %step.tool_name, "Deadline expired during tool call");
                    tool_results.push(
                        ToolResult::failure(&step.tool_name, "cancelled: deadline expired")
                            .with_error(ErrorKind::Cancelled),
                    );
                    let attempt = record(
                        Some(analysis.plan.clone()),
                        tool_results,
                        Some(analysis.interaction_id.clone()),
                        AttemptError::new(
                            ErrorKind::Cancelled,
                            format!("deadline expired during {}", step.tool_name),
                        ),
                    );
                    self.store.append_attempt(&workflow.fix_id, attempt).await?;
                    return Ok(AttemptOutcome::Aborted);
                }
            }
        }

        self.set_phase(Phase::Verifying);
        tokio::time::sleep(self.config.settle_delay).await;
        let after = self.monitor.refresh_many(&workflow.scope).await;
        let failed_resources = verify(&workflow.context, &before, &after);
        let resolved = failed_resources.is_empty();

        let attempt = FixAttempt {
            attempt_number,
            fix_plan: Some(analysis.plan),
            tool_results,
            before,
            after,
            execution_status: if resolved {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failed
            },
            issues_resolved: resolved,
            failed_resources,
            interaction_id: Some(analysis.interaction_id),
            error: None,
            started_at,
            finished_at: Utc::now(),
        };
        let previous = PreviousAttempt {
            attempt_number,
            tools_used: attempt.tools_used(),
            failed_resources: attempt.failed_resources.clone(),
            message: format!(
                "Previous attempt {} did not resolve the issue. Please try a different approach.",
                attempt_number
            ),
        };
        self.store.append_attempt(&workflow.fix_id, attempt).await?;

        if resolved {
            info!(attempt = attempt_number, "All issues resolved");
            Ok(AttemptOutcome::Resolved)
        } else {
            Ok(AttemptOutcome::Unresolved(previous))
        }
    }

    async fn finish(&self, fix_id: &FixId, final_status: FinalStatus) -> EngineResult<FixEvaluation> {
        self.store.seal(fix_id, final_status).await?;
        let phase = match final_status {
            FinalStatus::Success | FinalStatus::NoActionNeeded => Phase::DoneSuccess,
            FinalStatus::Failed | FinalStatus::FailedAfterRetries => Phase::DoneFailed,
        };
        self.set_phase(phase);
        info!(fix_id = %fix_id, final_status = ?final_status, "Fix workflow finished");

        self.store
            .get(fix_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(fix_id.clone()).into())
    }

    async fn capture(&self, scope: &[ResourceId], time_range: &str) -> FailureContext {
        let range = TimeRange::parse_relative(time_range).unwrap_or_else(|| {
            warn!(time_range, fallback = %self.config.default_time_range, "Invalid time range");
            TimeRange::parse_relative(&self.config.default_time_range)
                .unwrap_or_else(|| TimeRange::last(chrono::Duration::hours(1)))
        });

        let resources = self.monitor.refresh_many(scope).await;
        let logs = match self.logs.query_errors(range, Some(scope)).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(error = %e, "Log query failed, continuing without logs");
                Vec::new()
            }
        };
        debug!(resources = resources.len(), logs = logs.len(), "Failure context captured");

        FailureContext::new(resources, logs, self.config.application.clone())
    }

    fn acquire_slot(&self) -> EngineResult<OwnedMutexGuard<()>> {
        Arc::clone(&self.slot).try_lock_owned().map_err(|_| {
            let fix_id = self.state.borrow().fix_id.clone();
            warn!(fix_id = ?fix_id, "Rejecting request while a fix is in progress");
            EngineError::FixInProgress { fix_id }
        })
    }

    fn scope(&self, request: &TriggerRequest) -> Vec<ResourceId> {
        match &request.resource_ids {
            Some(ids) => ids
                .iter()
                .filter(|id| {
                    let known = self.monitor.descriptor(id).is_some();
                    if !known {
                        warn!(resource_id = %id, "Ignoring unknown resource in trigger");
                    }
                    known
                })
                .cloned()
                .collect(),
            None => self.monitor.resources().iter().map(|r| r.id.clone()).collect(),
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.state.send_modify(|s| {
            s.phase = phase;
            s.updated_at = Utc::now();
        });
        debug!(phase = %phase, "Phase changed");
    }
}

/// Resources unhealthy in the original context or in this attempt's
/// before-snapshot that are not healthy after the fix.
fn verify(
    original: &FailureContext,
    before: &[ResourceStatus],
    after: &[ResourceStatus],
) -> Vec<FailedResource> {
    let mut seen = HashSet::new();
    let targets = original
        .resources
        .iter()
        .chain(before.iter())
        .filter(|r| r.is_unhealthy())
        .filter(|r| seen.insert(r.id.clone()));

    let mut failed = Vec::new();
    for target in targets {
        let before_status = original
            .resources
            .iter()
            .find(|r| r.id == target.id)
            .map(|r| r.status)
            .unwrap_or(target.status);

        match after.iter().find(|r| r.id == target.id) {
            Some(now) if now.status == HealthStatus::Healthy => {}
            Some(now) => failed.push(FailedResource {
                resource_id: now.id.clone(),
                name: now.name.clone(),
                before_status,
                after_status: now.status,
                reason: still_failing(now),
            }),
            None => failed.push(FailedResource {
                resource_id: target.id.clone(),
                name: target.name.clone(),
                before_status,
                after_status: HealthStatus::Unknown,
                reason: "No status after fix".to_string(),
            }),
        }
    }
    failed
}

fn still_failing(status: &ResourceStatus) -> String {
    match primary_reading(status.kind, &status.metrics) {
        Some((label, value)) => format!(
            "Status still {} after fix ({} {:.0}%)",
            status.status, label, value
        ),
        None => format!("Status still {} after fix", status.status),
    }
}
