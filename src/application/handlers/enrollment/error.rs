//! Enrollment result taxonomy.

use thiserror::Error;

use crate::domain::enrollment::FieldErrors;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{GatewayError, GatewayErrorCode};

/// Why an enrollment did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrollmentError {
    /// User-correctable; nothing was written.
    #[error("Submission has {} invalid field(s)", .0.len())]
    Validation(FieldErrors),

    /// The charge was declined or the gateway failed. Pending records were
    /// compensated; the submission can be resubmitted unchanged.
    #[error("{message}")]
    Gateway {
        message: String,
        code: GatewayErrorCode,
    },

    /// Storage failed while writing; everything was rolled back.
    #[error("Enrollment could not be saved: {0}")]
    Transaction(DomainError),

    /// A catalog, contact, or lease lookup failed.
    #[error("Enrollment dependency failed: {0}")]
    Collaborator(DomainError),

    /// An invariant the pipeline relies on did not hold.
    #[error("Enrollment failed unexpectedly: {0}")]
    Internal(DomainError),
}

impl EnrollmentError {
    /// Field errors, when the submission itself was invalid.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            EnrollmentError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Whether resubmitting the same payload may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EnrollmentError::Gateway { code, .. } => code.is_retryable(),
            _ => false,
        }
    }
}

impl EnrollmentError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        EnrollmentError::Internal(DomainError::new(ErrorCode::InternalError, message))
    }
}

impl From<GatewayError> for EnrollmentError {
    fn from(err: GatewayError) -> Self {
        EnrollmentError::Gateway {
            message: err.message,
            code: err.code,
        }
    }
}

impl From<FieldErrors> for EnrollmentError {
    fn from(errors: FieldErrors) -> Self {
        EnrollmentError::Validation(errors)
    }
}
