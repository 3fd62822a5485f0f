//! Guarded transitions for lifecycle enums.
//!
//! Used by `FundingStatus` and `EnrollmentStage`: each declares its legal
//! moves once and every status change goes through `transition_to`.

use super::ValidationError;

/// A status enum with a fixed transition table.
///
/// ```ignore
/// let status = FundingStatus::Pending.transition_to(FundingStatus::Failed)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Every state reachable in one step.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns `target` if the move is legal.
    ///
    /// # Errors
    ///
    /// `ValidationError` naming both states otherwise.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if !self.can_transition_to(&target) {
            return Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ));
        }
        Ok(target)
    }

    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invoice-like lifecycle: drafted, issued, then paid or voided.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Invoice {
        Draft,
        Issued,
        Paid,
        Void,
    }

    impl StateMachine for Invoice {
        fn can_transition_to(&self, target: &Self) -> bool {
            self.valid_transitions().contains(target)
        }

        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Invoice::Draft => vec![Invoice::Issued, Invoice::Void],
                Invoice::Issued => vec![Invoice::Paid, Invoice::Void],
                Invoice::Paid | Invoice::Void => vec![],
            }
        }
    }

    #[test]
    fn legal_move_returns_target() {
        assert_eq!(Invoice::Issued.transition_to(Invoice::Paid), Ok(Invoice::Paid));
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        let err = Invoice::Draft.transition_to(Invoice::Paid).unwrap_err();
        assert!(err.to_string().contains("Draft"));
    }

    #[test]
    fn settled_states_are_terminal() {
        assert!(Invoice::Paid.is_terminal());
        assert!(Invoice::Void.is_terminal());
        assert!(!Invoice::Draft.is_terminal());
    }
}
