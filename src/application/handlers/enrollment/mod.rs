//! Enrollment handlers.
//!
//! - `EnrollMembershipHandler` - full create/update pipeline
//! - `PaymentCoordinator` - gateway charge with compensation
//! - `plan_type_change` - contribution rewrite on membership type change

mod enroll;
mod error;
mod payment_coordinator;
mod type_change;

pub use enroll::{EnrollMembershipHandler, EnrollmentOutcome, NO_RECEIPT_EMAIL};
pub use error::EnrollmentError;
pub use payment_coordinator::{contributor, AcceptedCharge, PaymentCoordinator, PendingCharge};
pub use type_change::{
    plan_type_change, TypeChangeEffect, CONTRIBUTION_UPDATED, COST_DIFFERS,
    FINANCIAL_TYPE_DIFFERS, RECURRING_NOT_UPDATED,
};
