use thiserror::Error;

use crate::context::schema::{FlowContext, FlowStage};

/// Failure raised by (or on behalf of) a collaborator call.
///
/// `Transient` failures are safe to retry; `Permanent` ones are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{operation} did not respond within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{operation} temporarily unavailable: {message}")]
    Transient { operation: String, message: String },

    #[error("{operation} failed: {message}")]
    Permanent { operation: String, message: String },
}

impl CollaboratorError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether a retry layer may reissue the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient { .. })
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::Timeout { operation, .. }
            | Self::Transient { operation, .. }
            | Self::Permanent { operation, .. } => operation,
        }
    }
}

/// Error types for flow orchestration.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Client '{client_id}' is not eligible for vocational rehabilitation services: {}", criteria.join(", "))]
    Eligibility {
        client_id: String,
        criteria: Vec<String>,
    },

    #[error("Stage '{stage}' aborted: {source}")]
    Integration {
        stage: FlowStage,
        #[source]
        source: CollaboratorError,
    },

    #[error("No workspace template for service category '{0}'")]
    UnsupportedCategory(String),

    #[error("Malformed partner integration list: {0}")]
    MalformedPartnerList(String),

    #[error("Flow cancelled before stage '{0}'")]
    Cancelled(FlowStage),

    #[error("Invalid stage transition: cannot go from '{from}' to '{to}'")]
    InvalidTransition { from: FlowStage, to: FlowStage },

    #[error("Context field '{0}' is already set")]
    ContextWrite(&'static str),

    #[error("Client '{0}' not found")]
    NotFound(String),

    #[error("Flow for client '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Client '{0}' already has a flow context")]
    AlreadyExists(String),

    #[error("Context field '{0}' has not been set")]
    MissingContext(&'static str),

    #[error("Collaborator call failed: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl FlowError {
    /// True when the underlying collaborator failure may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FlowError::Integration { source, .. } | FlowError::Collaborator(source) => {
                source.is_retryable()
            }
            _ => false,
        }
    }
}

/// Terminal error of a complete flow run.
///
/// Carries the context as it stood when the flow aborted. The context is
/// absent when the flow never got past referral intake.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct FlowFailure {
    #[source]
    pub error: FlowError,
    pub context: Option<Box<FlowContext>>,
}

impl FlowFailure {
    pub fn new(error: FlowError, context: Option<FlowContext>) -> Self {
        Self {
            error,
            context: context.map(Box::new),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
