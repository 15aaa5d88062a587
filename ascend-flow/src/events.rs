//! In-process event channel for flow side effects.
//!
//! The orchestrator publishes [`FlowEvent`]s; a dispatcher task fans each one
//! out to a spawned handler. Publishing never waits on a handler, and a lost
//! or failed handler only degrades bookkeeping: events carry a snapshot of
//! the context, never the live one.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::call::bounded;
use crate::collaborators::Collaborators;
use crate::context::schema::{FlowContext, FlowStage};

#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A stage finished and the context moved past it.
    StageComplete {
        context: Arc<FlowContext>,
        stage: FlowStage,
    },
    /// Eligibility and classification are known.
    AssessmentComplete { context: Arc<FlowContext> },
    /// Project, agents, knowledge-base entry and monitoring are in place.
    WorkspaceReady { context: Arc<FlowContext> },
    /// Partner integrations have settled.
    PartnerIntegration { context: Arc<FlowContext> },
    /// The flow aborted.
    FlowFailed {
        context: Arc<FlowContext>,
        reason: String,
    },
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::StageComplete { .. } => "stage_complete",
            FlowEvent::AssessmentComplete { .. } => "assessment_complete",
            FlowEvent::WorkspaceReady { .. } => "workspace_ready",
            FlowEvent::PartnerIntegration { .. } => "partner_integration",
            FlowEvent::FlowFailed { .. } => "flow_failed",
        }
    }

    pub fn context(&self) -> &FlowContext {
        match self {
            FlowEvent::StageComplete { context, .. }
            | FlowEvent::AssessmentComplete { context }
            | FlowEvent::WorkspaceReady { context }
            | FlowEvent::PartnerIntegration { context }
            | FlowEvent::FlowFailed { context, .. } => context,
        }
    }
}

/// Broadcast channel shared by the orchestrator and its subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish without waiting on any subscriber.
    pub fn publish(&self, event: FlowEvent) {
        let name = event.name();
        let client_id = event.context().client_id().to_string();
        if self.tx.send(event).is_err() {
            debug!(event = name, client_id = %client_id, "no event subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

/// Spawn the task that routes events to their side-effect handlers.
///
/// Each event is handled on its own task so a slow collaborator never holds
/// up the next event. Runs until `cancel` fires or the bus is dropped.
pub fn spawn_event_dispatcher(
    bus: &EventBus,
    collaborators: Collaborators,
    call_timeout: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("event dispatcher stopping");
                    break;
                }
                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            let collaborators = collaborators.clone();
                            tokio::spawn(async move {
                                handle_event(&collaborators, call_timeout, event).await;
                            });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "event dispatcher lagged, side effects dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("event bus closed, dispatcher stopping");
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Run the side effects for a single event. Failures are logged only.
pub async fn handle_event(collaborators: &Collaborators, call_timeout: Duration, event: FlowEvent) {
    let name = event.name();
    let client_id = event.context().client_id().to_string();
    debug!(event = name, client_id = %client_id, "handling flow event");

    match event {
        FlowEvent::StageComplete { context, stage } => {
            let data = json!({
                "status": "completed",
                "currentStage": context.current_stage(),
            });
            if let Err(e) = bounded(
                "update_stage_progress",
                call_timeout,
                collaborators
                    .progress
                    .update_stage_progress(&client_id, stage, data),
            )
            .await
            {
                warn!(client_id = %client_id, stage = %stage, error = %e, "stage progress not recorded");
            }
            if let Err(e) = bounded(
                "update_progress",
                call_timeout,
                collaborators.knowledge_base.update_progress(&client_id, stage),
            )
            .await
            {
                warn!(client_id = %client_id, stage = %stage, error = %e, "knowledge base progress not recorded");
            }
        }
        FlowEvent::AssessmentComplete { context } => {
            if let Err(e) = bounded(
                "notify_specialist",
                call_timeout,
                collaborators.intake.notify_specialist(&context),
            )
            .await
            {
                warn!(client_id = %client_id, error = %e, "specialist not notified");
            }
        }
        FlowEvent::WorkspaceReady { context } => {
            if let Err(e) = bounded(
                "send_workspace_access",
                call_timeout,
                collaborators.workspace.send_workspace_access(&context),
            )
            .await
            {
                warn!(client_id = %client_id, error = %e, "workspace access not delivered");
            }
        }
        FlowEvent::PartnerIntegration { context } => {
            if let Err(e) = bounded(
                "mark_flow_complete",
                call_timeout,
                collaborators.progress.mark_flow_complete(&context),
            )
            .await
            {
                warn!(client_id = %client_id, error = %e, "flow completion not recorded");
            }
        }
        FlowEvent::FlowFailed { context, reason } => {
            let data = json!({
                "status": "failed",
                "reason": reason,
                "failedDuring": context.stage_history().iter().rev().nth(1).map(|r| r.stage),
            });
            if let Err(e) = bounded(
                "update_stage_progress",
                call_timeout,
                collaborators
                    .progress
                    .update_stage_progress(&client_id, FlowStage::Failed, data),
            )
            .await
            {
                warn!(client_id = %client_id, error = %e, "flow failure not recorded");
            }
        }
    }
}
