//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresEnrollmentStore` - memberships, funding and their links

mod enrollment_store;

pub use enrollment_store::PostgresEnrollmentStore;
