//! Funding domain module.
//!
//! Contributions, recurring agreements, their line items and soft credits.

mod line_item;
mod record;
mod recurring;
mod soft_credit;

pub use line_item::{total_of, LineItem};
pub use record::{FundingRecord, FundingStatus, InstrumentSummary, NewFunding};
pub use recurring::{Cadence, RecurringFundingRecord, RecurringStatus};
pub use soft_credit::SoftCreditEntry;
