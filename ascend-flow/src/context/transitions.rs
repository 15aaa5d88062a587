use crate::context::schema::FlowStage;
use crate::error::{FlowError, Result};

/// Validate a stage transition is allowed.
pub fn validate_transition(from: FlowStage, to: FlowStage) -> Result<()> {
    if valid_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(FlowError::InvalidTransition { from, to })
    }
}

/// Get valid transitions from a stage.
///
/// Stages only move forward one step; `failed` is reachable from every
/// non-terminal stage and is itself terminal.
pub fn valid_transitions(from: FlowStage) -> Vec<FlowStage> {
    match from {
        FlowStage::InitialContact => vec![FlowStage::Assessment, FlowStage::Failed],
        FlowStage::Assessment => vec![FlowStage::ServicePlanning, FlowStage::Failed],
        FlowStage::ServicePlanning => vec![FlowStage::Implementation, FlowStage::Failed],
        FlowStage::Implementation => vec![FlowStage::PartnerIntegration, FlowStage::Failed],
        FlowStage::PartnerIntegration => vec![FlowStage::Completed, FlowStage::Failed],
        FlowStage::Completed | FlowStage::Failed => vec![],
    }
}

/// The stage that follows `from` on the happy path.
pub fn next_stage(from: FlowStage) -> Option<FlowStage> {
    valid_transitions(from)
        .into_iter()
        .find(|stage| *stage != FlowStage::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(validate_transition(FlowStage::InitialContact, FlowStage::Assessment).is_ok());
        assert!(validate_transition(FlowStage::InitialContact, FlowStage::Failed).is_ok());
        assert!(
            validate_transition(FlowStage::InitialContact, FlowStage::ServicePlanning).is_err()
        );

        assert!(validate_transition(FlowStage::Assessment, FlowStage::ServicePlanning).is_ok());
        assert!(validate_transition(FlowStage::Assessment, FlowStage::InitialContact).is_err());

        assert!(
            validate_transition(FlowStage::ServicePlanning, FlowStage::Implementation).is_ok()
        );
        assert!(
            validate_transition(FlowStage::Implementation, FlowStage::PartnerIntegration).is_ok()
        );
        assert!(validate_transition(FlowStage::PartnerIntegration, FlowStage::Completed).is_ok());
        assert!(validate_transition(FlowStage::PartnerIntegration, FlowStage::Failed).is_ok());

        // Terminal stages
        assert!(validate_transition(FlowStage::Completed, FlowStage::Failed).is_err());
        assert!(validate_transition(FlowStage::Failed, FlowStage::InitialContact).is_err());
        assert!(validate_transition(FlowStage::Failed, FlowStage::Failed).is_err());
    }

    #[test]
    fn test_transitions_never_move_backward() {
        for from in FlowStage::ALL {
            for to in valid_transitions(from) {
                assert!(to > from, "{} -> {} regresses", from, to);
            }
        }
    }

    #[test]
    fn test_next_stage_walks_happy_path() {
        let mut stage = FlowStage::InitialContact;
        let mut walked = vec![stage];
        while let Some(next) = next_stage(stage) {
            walked.push(next);
            stage = next;
        }
        assert_eq!(walked.len(), 6);
        assert_eq!(walked.last(), Some(&FlowStage::Completed));
    }
}
