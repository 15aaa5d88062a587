//! Deterministic in-memory collaborators.
//!
//! Used by the server until real adapters are wired in, and by tests. Every
//! operation can be made to fail or stall through a [`Fault`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;

use crate::collaborators::types::*;
use crate::collaborators::{
    Assessment, CallResult, Intake, Interview, KnowledgeBase, Partners, ProgressMonitor,
    Workspace,
};
use crate::context::schema::{FlowContext, FlowStage, Referral};
use crate::error::CollaboratorError;

/// Injected misbehaviour for a single operation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Return a permanent error.
    Fail(String),
    /// Return a transient error.
    Unavailable(String),
    /// Sleep before answering normally.
    Delay(Duration),
}

/// Progress snapshots kept in memory, cloned on every read.
#[derive(Default)]
pub struct InMemoryProgressMonitor {
    snapshots: RwLock<HashMap<String, ProgressSnapshot>>,
}

impl InMemoryProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    async fn upsert<F>(&self, client_id: &str, update: F)
    where
        F: FnOnce(&mut ProgressSnapshot),
    {
        let mut snapshots = self.snapshots.write().await;
        let snapshot = snapshots
            .entry(client_id.to_string())
            .or_insert_with(|| ProgressSnapshot {
                client_id: client_id.to_string(),
                current_stage: FlowStage::InitialContact,
                stages: BTreeMap::new(),
                monitoring_id: None,
                completed: false,
                updated_at: Utc::now(),
            });
        update(snapshot);
        snapshot.updated_at = Utc::now();
    }
}

#[async_trait]
impl ProgressMonitor for InMemoryProgressMonitor {
    async fn initialize_monitoring(&self, context: &FlowContext) -> CallResult<MonitoringHandle> {
        let monitoring_id = format!("mon-{}", context.client_id());
        let stage = context.current_stage();
        let id = monitoring_id.clone();
        self.upsert(context.client_id(), move |snapshot| {
            snapshot.monitoring_id = Some(id);
            if stage > snapshot.current_stage {
                snapshot.current_stage = stage;
            }
        })
        .await;
        Ok(MonitoringHandle { monitoring_id })
    }

    async fn update_stage_progress(
        &self,
        client_id: &str,
        stage: FlowStage,
        data: serde_json::Value,
    ) -> CallResult<()> {
        let status = data
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("completed")
            .to_string();
        self.upsert(client_id, move |snapshot| {
            if stage > snapshot.current_stage {
                snapshot.current_stage = stage;
            }
            snapshot.stages.insert(
                stage.to_string(),
                StageProgress {
                    status,
                    data,
                    updated_at: Utc::now(),
                },
            );
        })
        .await;
        Ok(())
    }

    async fn get_client_progress(&self, client_id: &str) -> CallResult<Option<ProgressSnapshot>> {
        Ok(self.snapshots.read().await.get(client_id).cloned())
    }

    async fn mark_flow_complete(&self, context: &FlowContext) -> CallResult<()> {
        let integrations = context.partner_integrations().to_vec();
        self.upsert(context.client_id(), move |snapshot| {
            snapshot.current_stage = FlowStage::Completed;
            snapshot.completed = true;
            snapshot.stages.insert(
                FlowStage::Completed.to_string(),
                StageProgress {
                    status: "completed".to_string(),
                    data: json!({ "partnerIntegrations": integrations }),
                    updated_at: Utc::now(),
                },
            );
        })
        .await;
        Ok(())
    }
}

/// One value implementing every collaborator capability.
pub struct StubCollaborators {
    faults: HashMap<&'static str, Fault>,
    eligible: bool,
    readiness: Option<u8>,
    category: Option<String>,
    business_partners: Option<Vec<String>>,
    calls: Mutex<Vec<String>>,
    progress: InMemoryProgressMonitor,
}

impl Default for StubCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl StubCollaborators {
    pub fn new() -> Self {
        Self {
            faults: HashMap::new(),
            eligible: true,
            readiness: None,
            category: None,
            business_partners: None,
            calls: Mutex::new(Vec::new()),
            progress: InMemoryProgressMonitor::new(),
        }
    }

    pub fn with_fault(mut self, operation: &'static str, fault: Fault) -> Self {
        self.faults.insert(operation, fault);
        self
    }

    pub fn with_eligibility(mut self, eligible: bool) -> Self {
        self.eligible = eligible;
        self
    }

    pub fn with_readiness(mut self, score: u8) -> Self {
        self.readiness = Some(score.min(100));
        self
    }

    /// Force the classification result.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_business_partners(mut self, partners: Vec<String>) -> Self {
        self.business_partners = Some(partners);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Operations invoked so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == operation).count()
    }

    fn record(&self, operation: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(operation.to_string());
        }
    }

    async fn enter(&self, operation: &'static str) -> CallResult<()> {
        self.record(operation);
        match self.faults.get(operation) {
            None => Ok(()),
            Some(Fault::Fail(message)) => Err(CollaboratorError::permanent(operation, message)),
            Some(Fault::Unavailable(message)) => {
                Err(CollaboratorError::transient(operation, message))
            }
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
        }
    }

    fn profile_of(context: &FlowContext) -> ClientProfile {
        context.client_data.profile.clone().unwrap_or_default()
    }

    fn readiness_of(&self, profile: &ClientProfile) -> u8 {
        if let Some(score) = self.readiness {
            return score;
        }
        let mut score = 55u32;
        if profile.has_business_plan {
            score += 10;
        }
        score += (profile.experience_years * 3).min(30);
        score.min(100) as u8
    }
}

#[async_trait]
impl Intake for StubCollaborators {
    async fn collect_client_data(
        &self,
        referral: &Referral,
        interview: &InterviewRecord,
    ) -> CallResult<ClientProfile> {
        self.enter("collect_client_data").await?;
        let info = &referral.client_info;
        if info.name.trim().is_empty() {
            return Err(CollaboratorError::permanent(
                "collect_client_data",
                "client name is required",
            ));
        }
        let has_business_plan = interview.goals.iter().any(|g| g.contains("plan"));
        Ok(ClientProfile {
            name: info.name.clone(),
            business_type: info.business_type.clone(),
            email: info.email.clone(),
            location: info.location.clone(),
            experience_years: 3,
            has_business_plan,
            funding_sources: vec!["vr_grant".to_string()],
        })
    }

    async fn notify_specialist(&self, _context: &FlowContext) -> CallResult<()> {
        self.enter("notify_specialist").await
    }
}

#[async_trait]
impl Interview for StubCollaborators {
    async fn conduct_initial_interview(&self, referral: &Referral) -> CallResult<InterviewRecord> {
        self.enter("conduct_initial_interview").await?;
        let business = &referral.client_info.business_type;
        Ok(InterviewRecord {
            summary: format!(
                "{} wants to start a {} business",
                referral.client_info.name, business
            ),
            goals: vec![
                format!("launch {} services", business),
                "achieve sustainable income".to_string(),
            ],
            accommodations: vec!["flexible scheduling".to_string()],
            conducted_by: "intake-agent".to_string(),
        })
    }

    async fn assign_ai_agents(&self, context: &FlowContext) -> CallResult<AgentAssignment> {
        self.enter("assign_ai_agents").await?;
        let mut agents = vec![
            "business-plan-coach".to_string(),
            "compliance-assistant".to_string(),
        ];
        if context.service_category() == Some(SUPPORTED_SELF_EMPLOYMENT) {
            agents.push("vr-liaison".to_string());
        }
        Ok(AgentAssignment { agents })
    }
}

#[async_trait]
impl Assessment for StubCollaborators {
    async fn analyze_client_profile(&self, profile: &ClientProfile) -> CallResult<ProfileAnalysis> {
        self.enter("analyze_client_profile").await?;
        let mut strengths = vec![format!("{} domain knowledge", profile.business_type)];
        let mut gaps = Vec::new();
        if profile.experience_years >= 3 {
            strengths.push("prior industry experience".to_string());
        }
        if !profile.has_business_plan {
            gaps.push("no written business plan".to_string());
        }
        Ok(ProfileAnalysis {
            summary: format!("{} strengths, {} gaps", strengths.len(), gaps.len()),
            strengths,
            gaps,
        })
    }

    async fn check_vr_eligibility(&self, _context: &FlowContext) -> CallResult<EligibilityResult> {
        self.enter("check_vr_eligibility").await?;
        let criteria = if self.eligible {
            vec![
                "documented disability".to_string(),
                "open VR case".to_string(),
                "self-employment employment goal".to_string(),
            ]
        } else {
            vec!["no open VR case".to_string()]
        };
        Ok(EligibilityResult {
            eligible: self.eligible,
            criteria,
        })
    }

    async fn assess_business_readiness(
        &self,
        context: &FlowContext,
    ) -> CallResult<ReadinessAssessment> {
        self.enter("assess_business_readiness").await?;
        let profile = Self::profile_of(context);
        let score = self.readiness_of(&profile);
        let mut notes = Vec::new();
        if score >= 50 {
            notes.push("ready to begin formation".to_string());
        } else {
            notes.push("needs readiness coaching first".to_string());
        }
        if !profile.has_business_plan {
            notes.push("business plan required".to_string());
        }
        Ok(ReadinessAssessment { score, notes })
    }

    async fn classify_service_category(
        &self,
        context: &FlowContext,
    ) -> CallResult<ServiceClassification> {
        self.enter("classify_service_category").await?;
        let score = context
            .assessment_results
            .readiness
            .as_ref()
            .map(|r| r.score)
            .unwrap_or(0);
        let profile = Self::profile_of(context);

        let category = match &self.category {
            Some(forced) => forced.clone(),
            None if score < 50 => BUSINESS_READINESS_COACHING.to_string(),
            None if context.referral_source == "vr_agency" => {
                SUPPORTED_SELF_EMPLOYMENT.to_string()
            }
            None if profile.has_business_plan && profile.experience_years >= 5 => {
                BUSINESS_EXPANSION.to_string()
            }
            None => SMALL_BUSINESS_STARTUP.to_string(),
        };

        let (estimated_cost, estimated_duration_weeks) = catalog()
            .into_iter()
            .find(|c| c.id == category)
            .map(|c| (c.estimated_cost, c.estimated_duration_weeks))
            .unwrap_or((0, 0));

        Ok(ServiceClassification {
            rationale: format!("readiness score {} via {}", score, context.referral_source),
            category,
            estimated_cost,
            estimated_duration_weeks,
        })
    }

    async fn determine_core_services(&self, context: &FlowContext) -> CallResult<Vec<String>> {
        self.enter("determine_core_services").await?;
        let mut services = vec![
            "business_plan_development".to_string(),
            "entity_formation".to_string(),
        ];
        if context.service_category() == Some(SUPPORTED_SELF_EMPLOYMENT) {
            services.push("vr_milestone_reporting".to_string());
        }
        Ok(services)
    }

    async fn recommend_addon_services(&self, context: &FlowContext) -> CallResult<Vec<String>> {
        self.enter("recommend_addon_services").await?;
        let gaps = context
            .client_data
            .analysis
            .as_ref()
            .map(|a| a.gaps.len())
            .unwrap_or(0);
        let mut addons = vec!["website_setup".to_string()];
        if gaps > 0 {
            addons.push("mentorship".to_string());
        }
        Ok(addons)
    }

    async fn get_available_service_categories(&self) -> CallResult<Vec<ServiceCategory>> {
        self.enter("get_available_service_categories").await?;
        Ok(catalog())
    }
}

#[async_trait]
impl Workspace for StubCollaborators {
    async fn create_workspace_configuration(
        &self,
        context: &FlowContext,
        template: &str,
    ) -> CallResult<WorkspaceConfig> {
        self.enter("create_workspace_configuration").await?;
        let services = context
            .service_plan
            .as_ref()
            .map(|p| p.core_services.clone())
            .unwrap_or_default();
        let name = context
            .client_data
            .profile
            .as_ref()
            .map(|p| format!("{} Business Launch", p.name))
            .unwrap_or_else(|| format!("Client {}", context.client_id()));
        Ok(WorkspaceConfig {
            template: template.to_string(),
            name,
            sections: vec![
                "overview".to_string(),
                "milestones".to_string(),
                "documents".to_string(),
            ],
            settings: json!({ "services": services }),
        })
    }

    async fn generate_project(
        &self,
        client_id: &str,
        _config: &WorkspaceConfig,
    ) -> CallResult<ProjectHandle> {
        self.enter("generate_project").await?;
        let project_id = format!("proj-{}", client_id);
        Ok(ProjectHandle {
            url: format!("https://workspace.example.com/projects/{}", project_id),
            project_id,
        })
    }

    async fn send_workspace_access(&self, _context: &FlowContext) -> CallResult<()> {
        self.enter("send_workspace_access").await
    }
}

#[async_trait]
impl KnowledgeBase for StubCollaborators {
    async fn create_client_entry(&self, context: &FlowContext) -> CallResult<KnowledgeBaseEntry> {
        self.enter("create_client_entry").await?;
        let entry_id = format!("kb-{}", context.client_id());
        Ok(KnowledgeBaseEntry {
            url: format!("https://notion.example.com/{}", entry_id),
            entry_id,
        })
    }

    async fn update_progress(&self, _client_id: &str, _stage: FlowStage) -> CallResult<()> {
        self.enter("update_progress").await
    }
}

#[async_trait]
impl Partners for StubCollaborators {
    async fn process_referral(&self, referral: &Referral) -> CallResult<ReferralReceipt> {
        self.enter("process_referral").await?;
        Ok(ReferralReceipt {
            referral_id: format!("ref-{}", uuid::Uuid::new_v4()),
            partner: referral.source.clone(),
            received_at: Utc::now(),
        })
    }

    async fn integrate_insurance(&self, context: &FlowContext) -> CallResult<serde_json::Value> {
        self.enter("integrate_insurance").await?;
        Ok(json!({ "policyQuoteId": format!("ins-{}", context.client_id()) }))
    }

    async fn integrate_tax_services(
        &self,
        context: &FlowContext,
    ) -> CallResult<serde_json::Value> {
        self.enter("integrate_tax_services").await?;
        Ok(json!({ "taxAccountId": format!("tax-{}", context.client_id()) }))
    }

    async fn get_business_service_partners(&self, category: &str) -> CallResult<Vec<String>> {
        self.enter("get_business_service_partners").await?;
        if let Some(partners) = &self.business_partners {
            return Ok(partners.clone());
        }
        let partners: &[&str] = match category {
            SUPPORTED_SELF_EMPLOYMENT => &["registered_agent", "business_banking"],
            SMALL_BUSINESS_STARTUP => &["registered_agent", "business_banking", "accounting"],
            BUSINESS_EXPANSION => &["accounting", "payroll"],
            _ => &[],
        };
        Ok(partners.iter().map(|p| p.to_string()).collect())
    }

    async fn integrate_business_service(
        &self,
        partner: &str,
        context: &FlowContext,
    ) -> CallResult<serde_json::Value> {
        self.enter("integrate_business_service").await?;
        Ok(json!({ "partner": partner, "accountId": format!("{}-{}", partner, context.client_id()) }))
    }
}

#[async_trait]
impl ProgressMonitor for StubCollaborators {
    async fn initialize_monitoring(&self, context: &FlowContext) -> CallResult<MonitoringHandle> {
        self.enter("initialize_monitoring").await?;
        self.progress.initialize_monitoring(context).await
    }

    async fn update_stage_progress(
        &self,
        client_id: &str,
        stage: FlowStage,
        data: serde_json::Value,
    ) -> CallResult<()> {
        self.enter("update_stage_progress").await?;
        self.progress
            .update_stage_progress(client_id, stage, data)
            .await
    }

    async fn get_client_progress(&self, client_id: &str) -> CallResult<Option<ProgressSnapshot>> {
        self.enter("get_client_progress").await?;
        self.progress.get_client_progress(client_id).await
    }

    async fn mark_flow_complete(&self, context: &FlowContext) -> CallResult<()> {
        self.enter("mark_flow_complete").await?;
        self.progress.mark_flow_complete(context).await
    }
}

/// Built-in service catalog.
pub fn catalog() -> Vec<ServiceCategory> {
    vec![
        ServiceCategory {
            id: SUPPORTED_SELF_EMPLOYMENT.to_string(),
            name: "Supported Self-Employment".to_string(),
            description: "VR-funded business launch with milestone reporting".to_string(),
            estimated_cost: 4_500,
            estimated_duration_weeks: 16,
        },
        ServiceCategory {
            id: SMALL_BUSINESS_STARTUP.to_string(),
            name: "Small Business Startup".to_string(),
            description: "Entity formation, banking and bookkeeping setup".to_string(),
            estimated_cost: 3_000,
            estimated_duration_weeks: 12,
        },
        ServiceCategory {
            id: BUSINESS_EXPANSION.to_string(),
            name: "Business Expansion".to_string(),
            description: "Growth planning for an operating business".to_string(),
            estimated_cost: 6_000,
            estimated_duration_weeks: 20,
        },
        ServiceCategory {
            id: BUSINESS_READINESS_COACHING.to_string(),
            name: "Business Readiness Coaching".to_string(),
            description: "Coaching toward a viable business plan".to_string(),
            estimated_cost: 1_200,
            estimated_duration_weeks: 8,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fault_fail_returns_permanent_error() {
        let stub =
            StubCollaborators::new().with_fault("generate_project", Fault::Fail("quota".into()));
        let config = WorkspaceConfig {
            template: "t".to_string(),
            name: "n".to_string(),
            sections: vec![],
            settings: serde_json::Value::Null,
        };
        let err = stub.generate_project("c-1", &config).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.operation(), "generate_project");
        assert_eq!(stub.call_count("generate_project"), 1);
    }

    #[tokio::test]
    async fn test_fault_unavailable_is_retryable() {
        let stub = StubCollaborators::new()
            .with_fault("integrate_insurance", Fault::Unavailable("503".into()));
        let ctx = FlowContext::new("c-1", "vr_agency");
        let err = stub.integrate_insurance(&ctx).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_ineligible_stub_returns_false_not_error() {
        let stub = StubCollaborators::new().with_eligibility(false);
        let ctx = FlowContext::new("c-1", "vr_agency");
        let result = stub.check_vr_eligibility(&ctx).await.unwrap();
        assert!(!result.eligible);
        assert!(!result.criteria.is_empty());
    }

    #[tokio::test]
    async fn test_business_partners_by_category() {
        let stub = StubCollaborators::new();
        let partners = stub
            .get_business_service_partners(SMALL_BUSINESS_STARTUP)
            .await
            .unwrap();
        assert_eq!(partners.len(), 3);
        let none = stub
            .get_business_service_partners(BUSINESS_READINESS_COACHING)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_progress_monitor_upserts_and_reads() {
        let monitor = InMemoryProgressMonitor::new();
        assert!(monitor.get_client_progress("c-1").await.unwrap().is_none());

        monitor
            .update_stage_progress("c-1", FlowStage::Assessment, json!({ "status": "in_progress" }))
            .await
            .unwrap();
        let snapshot = monitor.get_client_progress("c-1").await.unwrap().unwrap();
        assert_eq!(snapshot.current_stage, FlowStage::Assessment);
        assert_eq!(snapshot.stages["assessment"].status, "in_progress");
        assert!(!snapshot.completed);
    }

    #[tokio::test]
    async fn test_progress_monitor_never_regresses_stage() {
        let monitor = InMemoryProgressMonitor::new();
        monitor
            .update_stage_progress("c-1", FlowStage::Implementation, json!({}))
            .await
            .unwrap();
        monitor
            .update_stage_progress("c-1", FlowStage::Assessment, json!({}))
            .await
            .unwrap();
        let snapshot = monitor.get_client_progress("c-1").await.unwrap().unwrap();
        assert_eq!(snapshot.current_stage, FlowStage::Implementation);
        assert_eq!(snapshot.stages.len(), 2);
    }

    #[tokio::test]
    async fn test_mark_flow_complete() {
        let monitor = InMemoryProgressMonitor::new();
        let mut ctx = FlowContext::new("c-1", "vr_agency");
        ctx.push_partner_integration("insurance");
        monitor.mark_flow_complete(&ctx).await.unwrap();

        let snapshot = monitor.get_client_progress("c-1").await.unwrap().unwrap();
        assert!(snapshot.completed);
        assert_eq!(snapshot.current_stage, FlowStage::Completed);
        assert_eq!(
            snapshot.stages["completed"].data["partnerIntegrations"][0],
            "insurance"
        );
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let ids: std::collections::HashSet<String> = catalog().into_iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 4);
    }
}
