//! Enrollment transaction stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Where a submission is in the enrollment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStage {
    Resolving,
    Validating,
    /// Only entered for gateway charges with a positive amount.
    Charging,
    Persisting,
    Notifying,
    Done,
    Failed,
}

impl StateMachine for EnrollmentStage {
    fn can_transition_to(&self, target: &Self) -> bool {
        use EnrollmentStage::*;
        match (self, target) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Resolving, Validating)
            | (Validating, Charging)
            | (Validating, Persisting)
            | (Charging, Persisting)
            | (Persisting, Notifying)
            | (Notifying, Done) => true,
            _ => false,
        }
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use EnrollmentStage::*;
        match self {
            Resolving => vec![Validating, Failed],
            Validating => vec![Charging, Persisting, Failed],
            Charging => vec![Persisting, Failed],
            Persisting => vec![Notifying, Failed],
            Notifying => vec![Done, Failed],
            Done | Failed => vec![],
        }
    }
}

impl fmt::Display for EnrollmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollmentStage::Resolving => "resolving",
            EnrollmentStage::Validating => "validating",
            EnrollmentStage::Charging => "charging",
            EnrollmentStage::Persisting => "persisting",
            EnrollmentStage::Notifying => "notifying",
            EnrollmentStage::Done => "done",
            EnrollmentStage::Failed => "failed",
        };
        f.write_str(s)
    }
}
