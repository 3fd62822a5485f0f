//! Enrollment behavior configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::foundation::Currency;

/// Enrollment behavior switches
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentConfig {
    /// Rewrite the linked contribution's line items when a membership's
    /// type changes without a new payment
    #[serde(default = "default_true")]
    pub update_contribution_on_type_change: bool,

    /// Template used for offline receipts
    #[serde(default = "default_receipt_template")]
    pub receipt_template_key: String,

    /// ISO-4217 code used when a submission names no currency
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl EnrollmentConfig {
    /// Validate enrollment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.receipt_template_key.trim().is_empty() {
            return Err(ValidationError::MissingRequired("ENROLLMENT__RECEIPT_TEMPLATE_KEY"));
        }
        Currency::new(self.default_currency.as_str())
            .map_err(|_| ValidationError::InvalidCurrency(self.default_currency.clone()))?;
        Ok(())
    }

    /// Resolves the typed settings handed to the enrollment handler.
    pub fn settings(&self) -> Result<EnrollmentSettings, ValidationError> {
        let default_currency = Currency::new(self.default_currency.as_str())
            .map_err(|_| ValidationError::InvalidCurrency(self.default_currency.clone()))?;
        Ok(EnrollmentSettings {
            update_contribution_on_type_change: self.update_contribution_on_type_change,
            receipt_template_key: self.receipt_template_key.clone(),
            default_currency,
        })
    }
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            update_contribution_on_type_change: true,
            receipt_template_key: default_receipt_template(),
            default_currency: default_currency(),
        }
    }
}

/// Settings consumed by `EnrollMembershipHandler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentSettings {
    pub update_contribution_on_type_change: bool,
    pub receipt_template_key: String,
    pub default_currency: Currency,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            update_contribution_on_type_change: true,
            receipt_template_key: default_receipt_template(),
            default_currency: Currency::usd(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_receipt_template() -> String {
    "membership_offline_receipt".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}
