//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Collaborator Ports
//!
//! - `CatalogReader` - Membership types, price sets, status rules
//! - `ContactDirectory` - Contact names and emails
//! - `ChargeGateway` - External payment gateway
//! - `ReceiptSender` - Templated receipt delivery
//!
//! ## Storage Ports
//!
//! - `EnrollmentStore` / `StoreTransaction` - Transactional record store
//! - `MembershipLease` - Per-membership update serialization

mod catalog_reader;
mod charge_gateway;
mod contact_directory;
mod enrollment_store;
mod membership_lease;
mod receipt_sender;

pub use catalog_reader::CatalogReader;
pub use charge_gateway::{
    ChargeGateway, ChargeRequest, ChargeResult, ChargeStatus, Contributor, GatewayError,
    GatewayErrorCode, RecurringTerms,
};
pub use contact_directory::{Contact, ContactDirectory};
pub use enrollment_store::{EnrollmentStore, StoreTransaction};
pub use membership_lease::{LeaseToken, MembershipLease};
pub use receipt_sender::{ReceiptRequest, ReceiptSender};
