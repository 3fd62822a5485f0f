//! Catalog domain module.
//!
//! Read-only definitions owned by the catalog collaborator: membership
//! types, price sets and membership status rules. The enrollment engine
//! consumes these as plain data and never mutates them.

mod membership_type;
mod price_set;
mod status_rule;

pub use membership_type::{AutoRenewPolicy, DurationUnit, MembershipType, MonthDay, PeriodType};
pub use price_set::{FieldCardinality, PriceField, PriceOption, PriceSet};
pub use status_rule::{
    DateOffset, MembershipDates, RuleAnchor, RuleBoundary, StatusRule, PENDING_STATUS_NAME,
};
