//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `catalog` - Membership types, price sets and status rules (read-only)
//! - `membership` - Membership records, selection, dates and status
//! - `funding` - Contributions, recurring agreements, line items, soft credits
//! - `enrollment` - Submission model, validation and status messages

pub mod catalog;
pub mod enrollment;
pub mod foundation;
pub mod funding;
pub mod membership;
