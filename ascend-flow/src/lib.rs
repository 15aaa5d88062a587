//! ascend-flow library
//!
//! Client flow orchestration: referral intake through partner integration,
//! with side effects fanned out over an in-process event channel.

pub mod call;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;

pub use config::FlowConfig;
pub use context::{FlowContext, FlowStage, Referral};
pub use error::{CollaboratorError, FlowError, FlowFailure};
pub use events::{EventBus, FlowEvent};
pub use orchestrator::Orchestrator;
