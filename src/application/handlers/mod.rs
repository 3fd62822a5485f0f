//! Application handlers.
//!
//! Command handlers that orchestrate domain operations over the ports.

pub mod enrollment;

pub use enrollment::{
    EnrollMembershipHandler, EnrollmentError, EnrollmentOutcome, PaymentCoordinator,
};
