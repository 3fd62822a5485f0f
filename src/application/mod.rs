//! Application layer - Command handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Handlers own no state beyond their port handles and settings.

pub mod handlers;

pub use handlers::{
    EnrollMembershipHandler, EnrollmentError, EnrollmentOutcome, PaymentCoordinator,
};
