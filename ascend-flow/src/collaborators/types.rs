//! Values exchanged with collaborators.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::schema::FlowStage;

pub const SUPPORTED_SELF_EMPLOYMENT: &str = "supported_self_employment";
pub const SMALL_BUSINESS_STARTUP: &str = "small_business_startup";
pub const BUSINESS_EXPANSION: &str = "business_expansion";
pub const BUSINESS_READINESS_COACHING: &str = "business_readiness_coaching";

/// Acknowledgement returned by the referring partner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralReceipt {
    pub referral_id: String,
    pub partner: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub summary: String,
    pub goals: Vec<String>,
    pub accommodations: Vec<String>,
    pub conducted_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub name: String,
    pub business_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub experience_years: u32,
    pub has_business_plan: bool,
    pub funding_sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAnalysis {
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub eligible: bool,
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessAssessment {
    /// 0-100
    pub score: u8,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClassification {
    pub category: String,
    pub estimated_cost: u32,
    pub estimated_duration_weeks: u32,
    pub rationale: String,
}

/// Catalog entry describing a service category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCategory {
    pub id: String,
    pub name: String,
    pub description: String,
    pub estimated_cost: u32,
    pub estimated_duration_weeks: u32,
}

/// Opaque provisioning descriptor handed from planning to implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub template: String,
    pub name: String,
    pub sections: Vec<String>,
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectHandle {
    pub project_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAssignment {
    pub agents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseEntry {
    pub entry_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringHandle {
    pub monitoring_id: String,
}

/// Progress recorded for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    pub status: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Read-only view of a client's progress, maintained by progress monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub client_id: String,
    pub current_stage: FlowStage,
    #[serde(default)]
    pub stages: BTreeMap<String, StageProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_id: Option<String>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}
