//! Enrollment domain module.
//!
//! The submission model, working parameters threaded through the pipeline,
//! validation and the status summary.
//!
//! # Module Structure
//!
//! - `submission` - Strongly typed enrollment request
//! - `field_errors` - Field-keyed validation errors
//! - `stage` - Pipeline stage state machine
//! - `working` - Accumulating per-submission parameters
//! - `validation` - ValidationEngine
//! - `message` - MessageComposer

mod field_errors;
mod message;
mod stage;
mod submission;
mod validation;
mod working;

pub use field_errors::{FieldErrors, SubmissionField};
pub use message::{format_date, MembershipSummary, MessageComposer, StatusSummary};
pub use stage::EnrollmentStage;
pub use submission::{
    BillingDetails, EnrollmentSubmission, OverrideRequest, PayerDetails, PaymentDetails,
    PaymentMode,
};
pub use validation::{ValidationEngine, ValidationInput};
pub use working::{TypePlan, WorkingParameters};
