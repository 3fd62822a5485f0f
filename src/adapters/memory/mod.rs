//! In-memory adapters.
//!
//! Used by tests and by local runs without a database. Lock poisoning is
//! recovered rather than propagated; the guarded data stays consistent
//! because no method panics while holding a lock.

mod catalog;
mod lease;
mod receipts;
mod store;

pub use catalog::{InMemoryCatalog, InMemoryContactDirectory};
pub use lease::InMemoryMembershipLease;
pub use receipts::RecordingReceiptSender;
pub use store::{InMemoryEnrollmentStore, StoreOperation};
