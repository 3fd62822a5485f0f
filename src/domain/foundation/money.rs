//! Monetary amounts stored as integer minor units.
//!
//! Floats never touch money in this crate: amounts are `i64` minor units
//! (cents for most currencies) tagged with an ISO-4217 currency code.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// ISO-4217 currency code (three uppercase ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into().trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not a three-letter currency code", code),
            ));
        }
        Ok(Self(code))
    }

    /// US dollars, the fallback when nothing else is configured.
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits after the decimal point in the ISO-4217 minor unit.
    pub fn minor_digits(&self) -> u32 {
        match self.0.as_str() {
            "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
            | "UGX" | "UYI" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
            "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of money in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(minor_units: i64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    /// Adds two amounts of the same currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, ValidationError> {
        if self.currency != other.currency {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("cannot add {} to {}", other.currency, self.currency),
            ));
        }
        let sum = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or_else(|| ValidationError::invalid_format("amount", "amount overflow"))?;
        Ok(Money::new(sum, self.currency.clone()))
    }

    /// Multiplies by an integer quantity.
    pub fn times(&self, quantity: u32) -> Result<Money, ValidationError> {
        let product = self
            .minor_units
            .checked_mul(i64::from(quantity))
            .ok_or_else(|| ValidationError::invalid_format("amount", "amount overflow"))?;
        Ok(Money::new(product, self.currency.clone()))
    }

    /// Applies a rate expressed in basis points (1/100 of a percent),
    /// rounding half away from zero to the nearest minor unit.
    pub fn apply_basis_points(&self, basis_points: u32) -> Result<Money, ValidationError> {
        let raw = i128::from(self.minor_units) * i128::from(basis_points);
        let rounded = if raw >= 0 {
            (raw + 5_000) / 10_000
        } else {
            (raw - 5_000) / 10_000
        };
        let minor_units = i64::try_from(rounded)
            .map_err(|_| ValidationError::invalid_format("amount", "amount overflow"))?;
        Ok(Money::new(minor_units, self.currency.clone()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.unsigned_abs();
        let digits = self.currency.minor_digits();
        if digits == 0 {
            return write!(f, "{}{} {}", sign, abs, self.currency);
        }
        let scale = 10u64.pow(digits);
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            abs / scale,
            abs % scale,
            self.currency,
            width = digits as usize
        )
    }
}
