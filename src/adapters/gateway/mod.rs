//! Charge gateway adapters.
//!
//! - `HttpChargeGateway` - JSON over HTTP with bearer authentication
//! - `MockChargeGateway` - scripted outcomes for tests

mod http;
mod mock;

pub use http::HttpChargeGateway;
pub use mock::MockChargeGateway;
