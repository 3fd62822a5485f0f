//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Charge gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Base URL of the charge gateway
    pub gateway_url: String,

    /// Bearer API key for the gateway
    pub api_key: SecretString,

    /// Upper bound on a single charge call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Route live charges through the gateway's test mode
    #[serde(default)]
    pub test_mode: bool,
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.gateway_url.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__GATEWAY_URL"));
        }
        if !self.gateway_url.starts_with("https://") && !self.gateway_url.starts_with("http://") {
            return Err(ValidationError::InvalidGatewayUrl);
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__API_KEY"));
        }
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::new(),
            api_key: SecretString::new(String::new()),
            timeout_secs: default_timeout(),
            test_mode: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
