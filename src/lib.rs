//! Membership Enrollment - enrollment and billing orchestration
//!
//! This crate resolves membership selections, computes validity periods and
//! statuses, coordinates gateway charges with compensation on failure, and
//! persists memberships together with their funding records atomically.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
