//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, money, errors and the request
//! context that form the vocabulary of the enrollment domain.

mod calendar;
mod context;
mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use calendar::{day_before, shift, CalendarUnit};
pub use context::RequestContext;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    ContactId, FinancialTypeId, FundingId, LineItemId, MembershipId, MembershipStatusId,
    MembershipTypeId, PaymentInstrumentId, PriceFieldId, PriceOptionId, PriceSetId,
    RecurringFundingId, SoftCreditId, SoftCreditTypeId,
};
pub use money::{Currency, Money};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
