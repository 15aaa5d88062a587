//! Validation of inbound referral and stage-update payloads.

use crate::context::schema::{FlowStage, Referral};
use crate::error::{FlowError, Result};

/// A validation error or warning.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Payload field the issue refers to
    pub field: String,
    /// Description of the issue
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of validating a payload.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Errors that reject the payload
    pub errors: Vec<ValidationIssue>,
    /// Warnings that are logged but accepted
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there are no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    /// Collapse errors into a single `FlowError::Validation`.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let joined = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(FlowError::Validation(joined))
    }
}

/// Validate a referral before any flow is created for it.
pub fn validate_referral(referral: &Referral) -> ValidationResult {
    let mut result = ValidationResult::new();

    if referral.source.trim().is_empty() {
        result.add_error("source", "Referral source is empty");
    }

    let info = &referral.client_info;
    if info.name.trim().is_empty() {
        result.add_error("clientInfo.name", "Client name is empty");
    }
    if info.business_type.trim().is_empty() {
        result.add_error("clientInfo.businessType", "Business type is empty");
    }

    if let Some(client_id) = &referral.client_id {
        if client_id.trim().is_empty() {
            result.add_error("clientId", "Client id is empty");
        } else if client_id.chars().any(char::is_whitespace) {
            result.add_error("clientId", "Client id contains whitespace");
        }
    }

    if let Some(email) = &info.email {
        if !email.contains('@') {
            result.add_error("clientInfo.email", "Email address is missing '@'");
        }
    }

    if info.email.is_none() && info.phone.is_none() {
        result.add_warning("clientInfo", "No contact email or phone supplied");
    }

    result
}

/// Parse and validate the stage named by an out-of-band progress update.
pub fn validate_stage_update(client_id: &str, stage: &str) -> Result<FlowStage> {
    if client_id.trim().is_empty() {
        return Err(FlowError::Validation("clientId: Client id is empty".to_string()));
    }
    stage.parse()
}
