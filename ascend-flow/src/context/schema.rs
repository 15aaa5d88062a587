use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::types::{
    AgentAssignment, ClientProfile, EligibilityResult, InterviewRecord, KnowledgeBaseEntry,
    MonitoringHandle, ProfileAnalysis, ProjectHandle, ReadinessAssessment, ReferralReceipt,
    ServiceClassification, WorkspaceConfig,
};
use crate::context::timing::duration_ms;
use crate::context::transitions::validate_transition;
use crate::error::{FlowError, Result};

/// Stage of a client flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    InitialContact,
    Assessment,
    ServicePlanning,
    Implementation,
    PartnerIntegration,
    Completed,
    Failed,
}

impl FlowStage {
    pub const ALL: [FlowStage; 7] = [
        FlowStage::InitialContact,
        FlowStage::Assessment,
        FlowStage::ServicePlanning,
        FlowStage::Implementation,
        FlowStage::PartnerIntegration,
        FlowStage::Completed,
        FlowStage::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStage::InitialContact => "initial_contact",
            FlowStage::Assessment => "assessment",
            FlowStage::ServicePlanning => "service_planning",
            FlowStage::Implementation => "implementation",
            FlowStage::PartnerIntegration => "partner_integration",
            FlowStage::Completed => "completed",
            FlowStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStage::Completed | FlowStage::Failed)
    }
}

impl std::fmt::Display for FlowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlowStage {
    type Err = FlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        FlowStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| {
                FlowError::Validation(format!(
                    "unknown stage '{}'. Valid values: initial_contact, assessment, \
                     service_planning, implementation, partner_integration, completed, failed",
                    s
                ))
            })
    }
}

/// Client details supplied by the referring partner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub business_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Inbound referral payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub client_info: ClientInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Data gathered during initial contact. Every slot is written once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral: Option<ReferralReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview: Option<InterviewRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ClientProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProfileAnalysis>,
}

/// Outcome of the assessment stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilityResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ServiceClassification>,
}

/// Services selected during planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePlan {
    pub core_services: Vec<String>,
    pub addon_services: Vec<String>,
}

/// Outcome of one concurrently issued partner integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Settlement {
    Fulfilled { value: serde_json::Value },
    Rejected { reason: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub integration: String,
    #[serde(flatten)]
    pub settlement: Settlement,
}

impl SettlementRecord {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.settlement, Settlement::Fulfilled { .. })
    }
}

/// Collaborator handles accumulated while implementing services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_project: Option<ProjectHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<AgentAssignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base_entry: Option<KnowledgeBaseEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringHandle>,
    #[serde(default)]
    pub partner_integrations: Vec<SettlementRecord>,
}

/// One entry per stage the context has entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: FlowStage,
    pub entered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// The context threaded through every stage of a client flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    client_id: String,
    pub referral_source: String,
    current_stage: FlowStage,
    pub client_data: ClientData,
    pub assessment_results: AssessmentResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_plan: Option<ServicePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_config: Option<WorkspaceConfig>,
    partner_integrations: Vec<String>,
    pub progress_metrics: ProgressMetrics,
    stage_history: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl FlowContext {
    /// Create a context in `initial_contact`.
    pub fn new(client_id: impl Into<String>, referral_source: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            referral_source: referral_source.into(),
            current_stage: FlowStage::InitialContact,
            client_data: ClientData::default(),
            assessment_results: AssessmentResults::default(),
            service_category: None,
            service_plan: None,
            workspace_config: None,
            partner_integrations: Vec::new(),
            progress_metrics: ProgressMetrics::default(),
            stage_history: vec![StageRecord {
                stage: FlowStage::InitialContact,
                entered_at: Utc::now(),
                duration_ms: None,
            }],
            failure_reason: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn current_stage(&self) -> FlowStage {
        self.current_stage
    }

    pub fn service_category(&self) -> Option<&str> {
        self.service_category.as_deref()
    }

    pub fn partner_integrations(&self) -> &[String] {
        &self.partner_integrations
    }

    pub fn stage_history(&self) -> &[StageRecord] {
        &self.stage_history
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage.is_terminal()
    }

    /// Set the service category. Fails if one was already chosen.
    pub fn set_service_category(&mut self, category: impl Into<String>) -> Result<()> {
        write_once(&mut self.service_category, category.into(), "serviceCategory")
    }

    /// Record an attempted partner integration.
    pub fn push_partner_integration(&mut self, integration: impl Into<String>) {
        self.partner_integrations.push(integration.into());
    }

    /// Move to the next stage, enforcing the forward-only transition table.
    pub fn advance(&mut self, to: FlowStage) -> Result<()> {
        validate_transition(self.current_stage, to)?;
        self.enter(to);
        Ok(())
    }

    /// Move to `failed`. No-op when the context is already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.failure_reason = Some(reason.into());
        self.enter(FlowStage::Failed);
    }

    fn enter(&mut self, stage: FlowStage) {
        let now = Utc::now();
        if let Some(last) = self.stage_history.last_mut() {
            last.duration_ms = Some(duration_ms(last.entered_at, now));
        }
        self.stage_history.push(StageRecord {
            stage,
            entered_at: now,
            duration_ms: None,
        });
        self.current_stage = stage;
    }
}

/// Fill an empty slot, refusing to overwrite an existing value.
pub fn write_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<()> {
    if slot.is_some() {
        return Err(FlowError::ContextWrite(field));
    }
    *slot = Some(value);
    Ok(())
}
