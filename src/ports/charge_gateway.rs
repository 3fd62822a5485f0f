//! Charge gateway port for external payment processing.
//!
//! A single capability: charge an amount, optionally as the first payment of
//! a recurring agreement. Gateway calls can never join a storage
//! transaction, so callers compensate on failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, FundingId, Money, RecurringFundingId};
use crate::domain::funding::{Cadence, InstrumentSummary};

#[async_trait]
pub trait ChargeGateway: Send + Sync {
    /// Charge the request's amount.
    ///
    /// A returned `ChargeResult` may still be `Pending` (async payment
    /// methods); declines and transport failures are `GatewayError`s.
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError>;
}

/// Person being charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub contact_id: ContactId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Recurring agreement the charge opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringTerms {
    pub recurring_funding_id: RecurringFundingId,
    pub cadence: Cadence,
}

/// Request to charge a contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Funding record the charge settles; doubles as idempotency key.
    pub funding_id: FundingId,

    pub invoice_id: String,
    pub amount: Money,
    pub description: String,
    pub contributor: Contributor,

    /// Tokenized instrument from the gateway's client library.
    pub payment_token: String,

    pub is_test: bool,
    pub recurring: Option<RecurringTerms>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Completed,

    /// Accepted but not settled (bank transfer, 3DS pending, ...).
    Pending,
}

/// Outcome of an accepted charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub status: ChargeStatus,
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub instrument: InstrumentSummary,
    pub fee_amount: Option<Money>,

    /// Gateway's id for the recurring agreement, when one was opened.
    pub processor_reference: Option<String>,
}

/// Errors from gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    /// Error code for categorization.
    pub code: GatewayErrorCode,

    /// Human-readable message, shown to the submitter verbatim.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the same submission can be retried unchanged.
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::CardDeclined, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::new(
            GatewayErrorCode::Timeout,
            format!("Payment gateway did not respond within {} seconds", after_secs),
        )
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

/// Gateway error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    CardDeclined,
    InvalidRequest,
    AuthenticationError,
    NetworkError,
    Timeout,
    RateLimited,
    ProviderError,
    Unknown,
}

impl GatewayErrorCode {
    /// Declines are user-correctable by resubmitting; transport problems
    /// can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::CardDeclined
                | GatewayErrorCode::NetworkError
                | GatewayErrorCode::Timeout
                | GatewayErrorCode::RateLimited
                | GatewayErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::CardDeclined => "card_declined",
            GatewayErrorCode::InvalidRequest => "invalid_request",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::RateLimited => "rate_limited",
            GatewayErrorCode::ProviderError => "provider_error",
            GatewayErrorCode::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
