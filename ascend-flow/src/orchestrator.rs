//! Client flow orchestrator.
//!
//! Drives one client through the five stages in a fixed order. Stages 1-4
//! fail fast: the first collaborator error aborts the flow and the context
//! ends in `failed`. Stage 5 settles every partner integration and records
//! each outcome without aborting.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::call::bounded;
use crate::collaborators::types::{ProgressSnapshot, ServiceCategory, BUSINESS_READINESS_COACHING};
use crate::collaborators::{CallResult, Collaborators};
use crate::config::FlowConfig;
use crate::context::schema::{
    write_once, FlowContext, FlowStage, Referral, ServicePlan, Settlement, SettlementRecord,
};
use crate::context::transitions::next_stage;
use crate::context::validation::{validate_referral, validate_stage_update};
use crate::error::{FlowError, FlowFailure, Result};
use crate::events::{EventBus, FlowEvent};

/// A partner integration applicable to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerCall {
    Insurance,
    TaxServices,
    BusinessService(String),
}

impl PartnerCall {
    /// Identifier recorded in `partnerIntegrations`.
    pub fn id(&self) -> String {
        match self {
            PartnerCall::Insurance => "insurance".to_string(),
            PartnerCall::TaxServices => "tax_services".to_string(),
            PartnerCall::BusinessService(partner) => format!("business_service:{}", partner),
        }
    }
}

/// Integrations that apply to a service category, given its business-service
/// partners.
///
/// Fails on blank or duplicate partner ids.
pub fn applicable_integrations(
    category: &str,
    business_partners: &[String],
) -> Result<Vec<PartnerCall>> {
    let mut calls = Vec::new();
    if category != BUSINESS_READINESS_COACHING {
        calls.push(PartnerCall::Insurance);
    }
    calls.push(PartnerCall::TaxServices);

    let mut seen = HashSet::new();
    for partner in business_partners {
        let partner = partner.trim();
        if partner.is_empty() {
            return Err(FlowError::MalformedPartnerList(format!(
                "blank business-service partner for category '{}'",
                category
            )));
        }
        if !seen.insert(partner.to_string()) {
            return Err(FlowError::MalformedPartnerList(format!(
                "duplicate business-service partner '{}'",
                partner
            )));
        }
        calls.push(PartnerCall::BusinessService(partner.to_string()));
    }

    Ok(calls)
}

struct ActiveFlow {
    cancel: CancellationToken,
    stage: FlowStage,
}

#[derive(Default)]
struct FlowRegistry {
    running: HashMap<String, ActiveFlow>,
    /// Clients whose context has been created. Never reused.
    created: HashSet<String>,
}

/// Removes a flow from the running registry when it finishes.
struct RunningFlow<'a> {
    registry: &'a Mutex<FlowRegistry>,
    client_id: String,
}

impl Drop for RunningFlow<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .remove(&self.client_id);
    }
}

pub struct Orchestrator {
    collaborators: Collaborators,
    events: EventBus,
    config: FlowConfig,
    registry: Mutex<FlowRegistry>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, events: EventBus, config: FlowConfig) -> Self {
        Self {
            collaborators,
            events,
            config,
            registry: Mutex::new(FlowRegistry::default()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run all five stages for a referral.
    ///
    /// Returns the completed context, or the first stage 1-4 error together
    /// with the failed context. `cancel` is checked before every stage. A
    /// client id whose context was already created is refused.
    pub async fn execute_complete_flow(
        &self,
        mut referral: Referral,
        cancel: CancellationToken,
    ) -> std::result::Result<FlowContext, FlowFailure> {
        if let Err(e) = validate_referral(&referral).into_result() {
            return Err(FlowFailure::new(e, None));
        }

        let client_id = referral
            .client_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        let _running = self
            .register(&client_id, cancel.clone())
            .map_err(|e| FlowFailure::new(e, None))?;

        info!(client_id = %client_id, source = %referral.source, "starting client flow");

        if cancel.is_cancelled() {
            return Err(FlowFailure::new(
                FlowError::Cancelled(FlowStage::InitialContact),
                None,
            ));
        }
        let mut context = match self.process_partner_referral(&referral).await {
            Ok(context) => context,
            Err(e) => {
                error!(client_id = %client_id, error = %e, "referral intake failed");
                return Err(FlowFailure::new(e, None));
            }
        };
        self.registry().created.insert(client_id.clone());
        self.stage_complete(&context, FlowStage::InitialContact);

        let mut next = next_stage(FlowStage::InitialContact);
        while let Some(stage) = next.filter(|stage| !stage.is_terminal()) {
            if cancel.is_cancelled() {
                return Err(self.abort(context, FlowError::Cancelled(stage)));
            }
            let outcome = match stage {
                FlowStage::Assessment => self.process_assessment(&mut context).await,
                FlowStage::ServicePlanning => self.plan_services(&mut context).await,
                FlowStage::Implementation => self.implement_services(&mut context).await,
                FlowStage::PartnerIntegration => self.integrate_partners(&mut context).await,
                FlowStage::InitialContact | FlowStage::Completed | FlowStage::Failed => {
                    Err(FlowError::InvalidTransition {
                        from: context.current_stage(),
                        to: stage,
                    })
                }
            };
            if let Err(e) = outcome {
                return Err(self.abort(context, e));
            }
            self.stage_complete(&context, stage);
            next = next_stage(stage);
        }

        info!(
            client_id = %client_id,
            category = context.service_category().unwrap_or_default(),
            integrations = context.partner_integrations().len(),
            "client flow completed"
        );
        Ok(context)
    }

    /// Stage 1: take in the referral and build the client's context.
    pub async fn process_partner_referral(&self, referral: &Referral) -> Result<FlowContext> {
        let validation = validate_referral(referral);
        for warning in &validation.warnings {
            warn!(source = %referral.source, issue = %warning, "referral accepted with warning");
        }
        validation.into_result()?;

        let stage = FlowStage::InitialContact;
        let partners = &self.collaborators.partners;

        let receipt = self
            .call(stage, "process_referral", partners.process_referral(referral))
            .await?;
        let interview = self
            .call(
                stage,
                "conduct_initial_interview",
                self.collaborators.interview.conduct_initial_interview(referral),
            )
            .await?;
        let profile = self
            .call(
                stage,
                "collect_client_data",
                self.collaborators
                    .intake
                    .collect_client_data(referral, &interview),
            )
            .await?;
        let analysis = self
            .call(
                stage,
                "analyze_client_profile",
                self.collaborators.assessment.analyze_client_profile(&profile),
            )
            .await?;

        let client_id = referral
            .client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut context = FlowContext::new(client_id, referral.source.clone());
        let data = &mut context.client_data;
        write_once(&mut data.referral, receipt, "clientData.referral")?;
        write_once(&mut data.interview, interview, "clientData.interview")?;
        write_once(&mut data.profile, profile, "clientData.profile")?;
        write_once(&mut data.analysis, analysis, "clientData.analysis")?;

        context.advance(FlowStage::Assessment)?;
        info!(client_id = %context.client_id(), "referral processed");
        Ok(context)
    }

    /// Stage 2: eligibility gate, readiness and classification.
    pub async fn process_assessment(&self, context: &mut FlowContext) -> Result<()> {
        let stage = expect_stage(context, FlowStage::Assessment)?;
        let assessment = &self.collaborators.assessment;

        let eligibility = self
            .call(
                stage,
                "check_vr_eligibility",
                assessment.check_vr_eligibility(context),
            )
            .await?;
        let eligible = eligibility.eligible;
        let criteria = eligibility.criteria.clone();
        write_once(
            &mut context.assessment_results.eligibility,
            eligibility,
            "assessmentResults.eligibility",
        )?;
        if !eligible {
            return Err(FlowError::Eligibility {
                client_id: context.client_id().to_string(),
                criteria,
            });
        }

        let readiness = self
            .call(
                stage,
                "assess_business_readiness",
                assessment.assess_business_readiness(context),
            )
            .await?;
        write_once(
            &mut context.assessment_results.readiness,
            readiness,
            "assessmentResults.readiness",
        )?;

        let classification = self
            .call(
                stage,
                "classify_service_category",
                assessment.classify_service_category(context),
            )
            .await?;
        let category = classification.category.clone();
        write_once(
            &mut context.assessment_results.classification,
            classification,
            "assessmentResults.classification",
        )?;
        context.set_service_category(category.clone())?;

        context.advance(FlowStage::ServicePlanning)?;
        info!(client_id = %context.client_id(), category = %category, "assessment complete");
        self.events.publish(FlowEvent::AssessmentComplete {
            context: Arc::new(context.clone()),
        });
        Ok(())
    }

    /// Stage 3: choose services and describe the workspace.
    pub async fn plan_services(&self, context: &mut FlowContext) -> Result<()> {
        let stage = expect_stage(context, FlowStage::ServicePlanning)?;
        let assessment = &self.collaborators.assessment;

        let core_services = self
            .call(
                stage,
                "determine_core_services",
                assessment.determine_core_services(context),
            )
            .await?;
        let addon_services = self
            .call(
                stage,
                "recommend_addon_services",
                assessment.recommend_addon_services(context),
            )
            .await?;
        write_once(
            &mut context.service_plan,
            ServicePlan {
                core_services,
                addon_services,
            },
            "servicePlan",
        )?;

        let category = context
            .service_category()
            .ok_or(FlowError::MissingContext("serviceCategory"))?;
        let template = self
            .config
            .workspace_template(category)
            .ok_or_else(|| FlowError::UnsupportedCategory(category.to_string()))?
            .to_string();

        let workspace_config = self
            .call(
                stage,
                "create_workspace_configuration",
                self.collaborators
                    .workspace
                    .create_workspace_configuration(context, &template),
            )
            .await?;
        write_once(
            &mut context.workspace_config,
            workspace_config,
            "workspaceConfig",
        )?;

        context.advance(FlowStage::Implementation)?;
        info!(client_id = %context.client_id(), template = %template, "services planned");
        Ok(())
    }

    /// Stage 4: provision the project, agents, knowledge base and monitoring.
    pub async fn implement_services(&self, context: &mut FlowContext) -> Result<()> {
        let stage = expect_stage(context, FlowStage::Implementation)?;
        let workspace_config = context
            .workspace_config
            .clone()
            .ok_or(FlowError::MissingContext("workspaceConfig"))?;
        let client_id = context.client_id().to_string();

        let project = self
            .call(
                stage,
                "generate_project",
                self.collaborators
                    .workspace
                    .generate_project(&client_id, &workspace_config),
            )
            .await?;
        write_once(
            &mut context.progress_metrics.workspace_project,
            project,
            "progressMetrics.workspaceProject",
        )?;

        let agents = self
            .call(
                stage,
                "assign_ai_agents",
                self.collaborators.interview.assign_ai_agents(context),
            )
            .await?;
        write_once(
            &mut context.progress_metrics.agents,
            agents,
            "progressMetrics.agents",
        )?;

        let entry = self
            .call(
                stage,
                "create_client_entry",
                self.collaborators.knowledge_base.create_client_entry(context),
            )
            .await?;
        write_once(
            &mut context.progress_metrics.knowledge_base_entry,
            entry,
            "progressMetrics.knowledgeBaseEntry",
        )?;

        let monitoring = self
            .call(
                stage,
                "initialize_monitoring",
                self.collaborators.progress.initialize_monitoring(context),
            )
            .await?;
        write_once(
            &mut context.progress_metrics.monitoring,
            monitoring,
            "progressMetrics.monitoring",
        )?;

        context.advance(FlowStage::PartnerIntegration)?;
        info!(client_id = %client_id, "workspace ready");
        self.events.publish(FlowEvent::WorkspaceReady {
            context: Arc::new(context.clone()),
        });
        Ok(())
    }

    /// Stage 5: settle every applicable partner integration concurrently.
    ///
    /// Individual failures become rejected settlement records. Only a
    /// malformed partner list aborts the stage.
    pub async fn integrate_partners(&self, context: &mut FlowContext) -> Result<()> {
        expect_stage(context, FlowStage::PartnerIntegration)?;
        let category = context
            .service_category()
            .ok_or(FlowError::MissingContext("serviceCategory"))?
            .to_string();
        let partners = &self.collaborators.partners;
        let limit = self.config.collaborator_timeout;
        let mut settlements = Vec::new();

        let business_partners = match bounded(
            "get_business_service_partners",
            limit,
            partners.get_business_service_partners(&category),
        )
        .await
        {
            Ok(list) => list,
            Err(e) => {
                warn!(client_id = %context.client_id(), error = %e, "business-service partners unavailable");
                settlements.push(rejected("business_service_partners", &e));
                Vec::new()
            }
        };
        let calls = applicable_integrations(&category, &business_partners)?;

        let snapshot: &FlowContext = context;
        let settled = join_all(calls.iter().map(|call| async move {
            let outcome = match call {
                PartnerCall::Insurance => {
                    bounded(
                        "integrate_insurance",
                        limit,
                        partners.integrate_insurance(snapshot),
                    )
                    .await
                }
                PartnerCall::TaxServices => {
                    bounded(
                        "integrate_tax_services",
                        limit,
                        partners.integrate_tax_services(snapshot),
                    )
                    .await
                }
                PartnerCall::BusinessService(partner) => {
                    bounded(
                        "integrate_business_service",
                        limit,
                        partners.integrate_business_service(partner, snapshot),
                    )
                    .await
                }
            };
            (call.id(), outcome)
        }))
        .await;

        for (id, outcome) in settled {
            context.push_partner_integration(id.clone());
            match outcome {
                Ok(value) => settlements.push(SettlementRecord {
                    integration: id,
                    settlement: Settlement::Fulfilled { value },
                }),
                Err(e) => {
                    warn!(client_id = %context.client_id(), integration = %id, error = %e, "partner integration failed");
                    settlements.push(rejected(&id, &e));
                }
            }
        }

        let fulfilled = settlements.iter().filter(|s| s.is_fulfilled()).count();
        info!(
            client_id = %context.client_id(),
            attempted = context.partner_integrations().len(),
            fulfilled = fulfilled,
            "partner integrations settled"
        );
        context
            .progress_metrics
            .partner_integrations
            .extend(settlements);

        context.advance(FlowStage::Completed)?;
        self.events.publish(FlowEvent::PartnerIntegration {
            context: Arc::new(context.clone()),
        });
        Ok(())
    }

    /// Current progress snapshot for a client. Never waits on a running flow.
    ///
    /// A running flow that progress monitoring has not seen yet reports a
    /// bare snapshot at its current stage.
    pub async fn get_flow_status(&self, client_id: &str) -> Result<ProgressSnapshot> {
        let recorded = bounded(
            "get_client_progress",
            self.config.collaborator_timeout,
            self.collaborators.progress.get_client_progress(client_id),
        )
        .await?;
        if let Some(snapshot) = recorded {
            return Ok(snapshot);
        }

        let stage = self
            .registry()
            .running
            .get(client_id)
            .map(|flow| flow.stage)
            .ok_or_else(|| FlowError::NotFound(client_id.to_string()))?;
        Ok(ProgressSnapshot {
            client_id: client_id.to_string(),
            current_stage: stage,
            stages: BTreeMap::new(),
            monitoring_id: None,
            completed: false,
            updated_at: Utc::now(),
        })
    }

    /// Record out-of-band progress for a long-running stage.
    pub async fn update_flow_stage(
        &self,
        client_id: &str,
        stage: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let stage = validate_stage_update(client_id, stage)?;
        bounded(
            "update_stage_progress",
            self.config.collaborator_timeout,
            self.collaborators
                .progress
                .update_stage_progress(client_id, stage, data),
        )
        .await?;
        info!(client_id = %client_id, stage = %stage, "flow stage updated");
        Ok(())
    }

    pub async fn get_available_services(&self) -> Result<Vec<ServiceCategory>> {
        Ok(bounded(
            "get_available_service_categories",
            self.config.collaborator_timeout,
            self.collaborators
                .assessment
                .get_available_service_categories(),
        )
        .await?)
    }

    /// Signal a running flow to stop at its next stage boundary.
    ///
    /// Returns false when no flow is running for the client.
    pub fn cancel_flow(&self, client_id: &str) -> bool {
        match self.registry().running.get(client_id) {
            Some(flow) => {
                flow.cancel.cancel();
                info!(client_id = %client_id, "flow cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, client_id: &str) -> bool {
        self.registry().running.contains_key(client_id)
    }

    fn registry(&self) -> MutexGuard<'_, FlowRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, client_id: &str, cancel: CancellationToken) -> Result<RunningFlow<'_>> {
        let mut registry = self.registry();
        if registry.running.contains_key(client_id) {
            return Err(FlowError::AlreadyRunning(client_id.to_string()));
        }
        if registry.created.contains(client_id) {
            return Err(FlowError::AlreadyExists(client_id.to_string()));
        }
        registry.running.insert(
            client_id.to_string(),
            ActiveFlow {
                cancel,
                stage: FlowStage::InitialContact,
            },
        );
        Ok(RunningFlow {
            registry: &self.registry,
            client_id: client_id.to_string(),
        })
    }

    async fn call<T, F>(&self, stage: FlowStage, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = CallResult<T>>,
    {
        bounded(operation, self.config.collaborator_timeout, call)
            .await
            .map_err(|source| FlowError::Integration { stage, source })
    }

    fn stage_complete(&self, context: &FlowContext, stage: FlowStage) {
        if let Some(flow) = self.registry().running.get_mut(context.client_id()) {
            flow.stage = context.current_stage();
        }
        info!(client_id = %context.client_id(), stage = %stage, next = %context.current_stage(), "stage complete");
        self.events.publish(FlowEvent::StageComplete {
            context: Arc::new(context.clone()),
            stage,
        });
    }

    fn abort(&self, mut context: FlowContext, error: FlowError) -> FlowFailure {
        let failed_at = context.current_stage();
        context.fail(error.to_string());
        error!(
            client_id = %context.client_id(),
            stage = %failed_at,
            transient = error.is_transient(),
            error = %error,
            "client flow failed"
        );
        self.events.publish(FlowEvent::FlowFailed {
            context: Arc::new(context.clone()),
            reason: error.to_string(),
        });
        FlowFailure::new(error, Some(context))
    }
}

fn expect_stage(context: &FlowContext, expected: FlowStage) -> Result<FlowStage> {
    let current = context.current_stage();
    if current == expected {
        Ok(expected)
    } else {
        Err(FlowError::InvalidTransition {
            from: current,
            to: expected,
        })
    }
}

fn rejected(integration: &str, error: &crate::error::CollaboratorError) -> SettlementRecord {
    SettlementRecord {
        integration: integration.to_string(),
        settlement: Settlement::Rejected {
            reason: error.to_string(),
            retryable: error.is_retryable(),
        },
    }
}
