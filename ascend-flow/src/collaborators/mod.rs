//! Capability contracts the orchestrator depends on.
//!
//! Each trait is one external capability group. The orchestrator only ever
//! holds them as `Arc<dyn Trait>` inside [`Collaborators`], so real adapters
//! and the deterministic [`stub`] implementations are interchangeable.

pub mod stub;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::schema::{FlowContext, FlowStage, Referral};
use crate::error::CollaboratorError;
use types::{
    AgentAssignment, ClientProfile, EligibilityResult, InterviewRecord, KnowledgeBaseEntry,
    MonitoringHandle, ProfileAnalysis, ProgressSnapshot, ProjectHandle, ReadinessAssessment,
    ReferralReceipt, ServiceCategory, ServiceClassification, WorkspaceConfig,
};

pub type CallResult<T> = std::result::Result<T, CollaboratorError>;

/// Client intake and specialist notification.
#[async_trait]
pub trait Intake: Send + Sync {
    /// Fails on invalid client data.
    async fn collect_client_data(
        &self,
        referral: &Referral,
        interview: &InterviewRecord,
    ) -> CallResult<ClientProfile>;

    /// Best-effort.
    async fn notify_specialist(&self, context: &FlowContext) -> CallResult<()>;
}

/// Interviewing and AI agent assignment.
#[async_trait]
pub trait Interview: Send + Sync {
    async fn conduct_initial_interview(&self, referral: &Referral) -> CallResult<InterviewRecord>;
    async fn assign_ai_agents(&self, context: &FlowContext) -> CallResult<AgentAssignment>;
}

/// Eligibility, readiness and service classification.
#[async_trait]
pub trait Assessment: Send + Sync {
    async fn analyze_client_profile(&self, profile: &ClientProfile) -> CallResult<ProfileAnalysis>;

    /// Returns `eligible: false` for a valid but ineligible client rather
    /// than an error.
    async fn check_vr_eligibility(&self, context: &FlowContext) -> CallResult<EligibilityResult>;

    async fn assess_business_readiness(
        &self,
        context: &FlowContext,
    ) -> CallResult<ReadinessAssessment>;
    async fn classify_service_category(
        &self,
        context: &FlowContext,
    ) -> CallResult<ServiceClassification>;
    async fn determine_core_services(&self, context: &FlowContext) -> CallResult<Vec<String>>;
    async fn recommend_addon_services(&self, context: &FlowContext) -> CallResult<Vec<String>>;
    async fn get_available_service_categories(&self) -> CallResult<Vec<ServiceCategory>>;
}

/// Project workspace provisioning.
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn create_workspace_configuration(
        &self,
        context: &FlowContext,
        template: &str,
    ) -> CallResult<WorkspaceConfig>;
    async fn generate_project(
        &self,
        client_id: &str,
        config: &WorkspaceConfig,
    ) -> CallResult<ProjectHandle>;
    async fn send_workspace_access(&self, context: &FlowContext) -> CallResult<()>;
}

/// Knowledge-base recording.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn create_client_entry(&self, context: &FlowContext) -> CallResult<KnowledgeBaseEntry>;
    async fn update_progress(&self, client_id: &str, stage: FlowStage) -> CallResult<()>;
}

/// Upstream referral partners and downstream business-service partners.
///
/// Integration calls must be idempotent: a caller may reissue any of them.
#[async_trait]
pub trait Partners: Send + Sync {
    async fn process_referral(&self, referral: &Referral) -> CallResult<ReferralReceipt>;
    async fn integrate_insurance(&self, context: &FlowContext) -> CallResult<serde_json::Value>;
    async fn integrate_tax_services(&self, context: &FlowContext)
        -> CallResult<serde_json::Value>;
    async fn get_business_service_partners(&self, category: &str) -> CallResult<Vec<String>>;
    async fn integrate_business_service(
        &self,
        partner: &str,
        context: &FlowContext,
    ) -> CallResult<serde_json::Value>;
}

/// Progress snapshots polled by external callers.
#[async_trait]
pub trait ProgressMonitor: Send + Sync {
    async fn initialize_monitoring(&self, context: &FlowContext) -> CallResult<MonitoringHandle>;

    /// Upserts the snapshot for `client_id`.
    async fn update_stage_progress(
        &self,
        client_id: &str,
        stage: FlowStage,
        data: serde_json::Value,
    ) -> CallResult<()>;

    /// `None` when nothing has been recorded for the client.
    async fn get_client_progress(&self, client_id: &str) -> CallResult<Option<ProgressSnapshot>>;

    async fn mark_flow_complete(&self, context: &FlowContext) -> CallResult<()>;
}

/// Every collaborator the orchestrator needs, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub intake: Arc<dyn Intake>,
    pub interview: Arc<dyn Interview>,
    pub assessment: Arc<dyn Assessment>,
    pub workspace: Arc<dyn Workspace>,
    pub knowledge_base: Arc<dyn KnowledgeBase>,
    pub partners: Arc<dyn Partners>,
    pub progress: Arc<dyn ProgressMonitor>,
}

impl Collaborators {
    /// Use one value for every capability.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: Intake
            + Interview
            + Assessment
            + Workspace
            + KnowledgeBase
            + Partners
            + ProgressMonitor
            + 'static,
    {
        Self {
            intake: shared.clone(),
            interview: shared.clone(),
            assessment: shared.clone(),
            workspace: shared.clone(),
            knowledge_base: shared.clone(),
            partners: shared.clone(),
            progress: shared,
        }
    }
}
