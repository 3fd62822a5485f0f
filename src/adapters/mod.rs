//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `gateway` - Charge gateway over HTTP, plus a scripted mock
//! - `postgres` - Transactional enrollment store on PostgreSQL
//! - `memory` - In-memory store, catalog, contacts, receipts and lease

pub mod gateway;
pub mod memory;
pub mod postgres;

pub use gateway::{HttpChargeGateway, MockChargeGateway};
pub use memory::{
    InMemoryCatalog, InMemoryContactDirectory, InMemoryEnrollmentStore, InMemoryMembershipLease,
    RecordingReceiptSender, StoreOperation,
};
pub use postgres::PostgresEnrollmentStore;
