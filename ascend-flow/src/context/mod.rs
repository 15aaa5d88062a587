pub mod schema;
pub mod timing;
pub mod transitions;
pub mod validation;

// Re-export schema types for convenience
pub use schema::{
    AssessmentResults, ClientData, ClientInfo, FlowContext, FlowStage, ProgressMetrics, Referral,
    ServicePlan, Settlement, SettlementRecord, StageRecord,
};
