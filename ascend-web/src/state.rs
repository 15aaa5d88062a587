use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ascend_flow::Orchestrator;

/// Shared application state accessible by all handlers
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    /// Parent of every flow's cancellation token; cancelled on shutdown
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            orchestrator,
            shutdown,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Token for a new flow. Cancelled individually or with the server.
    pub fn flow_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascend_flow::collaborators::stub::StubCollaborators;
    use ascend_flow::collaborators::Collaborators;
    use ascend_flow::{EventBus, FlowConfig};

    fn state(shutdown: CancellationToken) -> Arc<AppState> {
        let collaborators = Collaborators::from_shared(StubCollaborators::new().into_shared());
        let orchestrator = Orchestrator::new(collaborators, EventBus::new(4), FlowConfig::default());
        AppState::new(Arc::new(orchestrator), shutdown)
    }

    #[test]
    fn test_flow_tokens_follow_shutdown() {
        let shutdown = CancellationToken::new();
        let state = state(shutdown.clone());
        let first = state.flow_token();
        let second = state.flow_token();

        first.cancel();
        assert!(!second.is_cancelled());

        shutdown.cancel();
        assert!(second.is_cancelled());
    }
}
