//! Membership domain module.
//!
//! Selection resolution, period/date calculation and status evaluation for
//! membership records.
//!
//! # Module Structure
//!
//! - `record` - MembershipRecord entity and status overrides
//! - `selection` - Catalog/direct selection resolution
//! - `dates` - Period calculation per membership type
//! - `status` - Status rule evaluation

mod dates;
mod record;
mod selection;
mod status;

pub use dates::{compute_dates, ComputedDates, DateCalculationError, DateInputs};
pub use record::{MembershipRecord, MembershipTerms, StatusOverride};
pub use selection::{
    resolve_catalog, resolve_direct, CatalogChoice, CatalogSelection, MembershipTypeSelection,
    ResolvedSelection, SelectedOption, SelectionError,
};
pub use status::{evaluate_status, pending_status, NoApplicableStatus};
