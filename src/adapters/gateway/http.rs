//! HTTP charge gateway adapter.
//!
//! Posts charges as JSON to `{gateway_url}/v1/charges` with a bearer key.
//! The invoice id doubles as the idempotency key so a retried submission
//! cannot double-charge.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::domain::foundation::Money;
use crate::domain::funding::{Cadence, InstrumentSummary};
use crate::ports::{
    ChargeGateway, ChargeRequest, ChargeResult, ChargeStatus, Contributor, GatewayError,
    GatewayErrorCode,
};

/// Charge gateway reached over HTTP.
pub struct HttpChargeGateway {
    base_url: String,
    api_key: SecretString,
    test_mode: bool,
    http_client: reqwest::Client,
}

impl HttpChargeGateway {
    /// Builds a client whose request timeout matches the configured bound.
    ///
    /// # Errors
    ///
    /// `ProviderError` if the HTTP client cannot be constructed.
    pub fn new(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                GatewayError::new(
                    GatewayErrorCode::ProviderError,
                    format!("Failed to build gateway client: {}", e),
                )
            })?;

        Ok(Self {
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            test_mode: config.test_mode,
            http_client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChargeBody<'a> {
    idempotency_key: &'a str,
    reference: String,
    amount: i64,
    currency: &'a str,
    description: &'a str,
    payment_token: &'a str,
    test: bool,
    contributor: &'a Contributor,
    #[serde(skip_serializing_if = "Option::is_none")]
    recurring: Option<RecurringBody>,
}

#[derive(Debug, Serialize)]
struct RecurringBody {
    reference: String,
    cadence: Cadence,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    transaction_id: Option<String>,
    card_type: Option<String>,
    pan_truncation: Option<String>,

    /// Processor fee in minor units of the charge currency.
    fee: Option<i64>,
    processor_reference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn error_code_for(status: StatusCode) -> GatewayErrorCode {
    match status {
        StatusCode::PAYMENT_REQUIRED => GatewayErrorCode::CardDeclined,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayErrorCode::AuthenticationError,
        StatusCode::TOO_MANY_REQUESTS => GatewayErrorCode::RateLimited,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayErrorCode::Timeout,
        s if s.is_client_error() => GatewayErrorCode::InvalidRequest,
        s if s.is_server_error() => GatewayErrorCode::ProviderError,
        _ => GatewayErrorCode::Unknown,
    }
}

/// Maps a non-success response to a `GatewayError`, preferring the
/// gateway's own message.
fn error_from_response(status: StatusCode, body: &str) -> GatewayError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| format!("Payment gateway returned {}", status));
    let err = GatewayError::new(error_code_for(status), message);
    match parsed.code {
        Some(code) => err.with_provider_code(code),
        None => err,
    }
}

fn result_from_response(response: ChargeResponse, amount: &Money) -> Result<ChargeResult, GatewayError> {
    let status = match response.status.as_str() {
        "completed" | "succeeded" => ChargeStatus::Completed,
        "pending" | "processing" => ChargeStatus::Pending,
        other => {
            return Err(GatewayError::new(
                GatewayErrorCode::ProviderError,
                format!("Unexpected charge status '{}'", other),
            ))
        }
    };

    Ok(ChargeResult {
        status,
        transaction_id: response.transaction_id,
        instrument: InstrumentSummary {
            card_type: response.card_type,
            pan_truncation: response.pan_truncation,
        },
        fee_amount: response
            .fee
            .map(|minor| Money::new(minor, amount.currency.clone())),
        processor_reference: response.processor_reference,
    })
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::new(GatewayErrorCode::Timeout, e.to_string())
    } else {
        GatewayError::network(e.to_string())
    }
}

#[async_trait]
impl ChargeGateway for HttpChargeGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError> {
        let url = format!("{}/v1/charges", self.base_url);
        let body = ChargeBody {
            idempotency_key: &request.invoice_id,
            reference: request.funding_id.to_string(),
            amount: request.amount.minor_units,
            currency: request.amount.currency.as_str(),
            description: &request.description,
            payment_token: &request.payment_token,
            test: request.is_test || self.test_mode,
            contributor: &request.contributor,
            recurring: request.recurring.map(|r| RecurringBody {
                reference: r.recurring_funding_id.to_string(),
                cadence: r.cadence,
            }),
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .header("Idempotency-Key", request.invoice_id.as_str())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "gateway rejected charge");
            return Err(error_from_response(status, &error_text));
        }

        let parsed: ChargeResponse = response.json().await.map_err(|e| {
            GatewayError::new(
                GatewayErrorCode::ProviderError,
                format!("Failed to parse gateway response: {}", e),
            )
        })?;

        result_from_response(parsed, &request.amount)
    }
}
