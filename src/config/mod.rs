//! Typed configuration for the enrollment engine
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `MEMBERSHIP_ENROLLMENT`
//! prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use membership_enrollment::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! let settings = config.enrollment.settings().expect("Invalid enrollment settings");
//! println!("Receipts use template {}", settings.receipt_template_key);
//! ```

mod database;
mod enrollment;
mod error;
mod logging;
mod payment;

pub use database::DatabaseConfig;
pub use enrollment::{EnrollmentConfig, EnrollmentSettings};
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use payment::PaymentConfig;

use serde::Deserialize;

/// Everything the engine reads at startup
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Postgres enrollment store
    pub database: DatabaseConfig,

    /// Charge gateway
    pub payment: PaymentConfig,

    /// Enrollment behavior switches
    #[serde(default)]
    pub enrollment: EnrollmentConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads `.env` (if any), then `MEMBERSHIP_ENROLLMENT__*` variables:
    ///
    /// - `MEMBERSHIP_ENROLLMENT__DATABASE__URL=...` -> `database.url`
    /// - `MEMBERSHIP_ENROLLMENT__PAYMENT__TIMEOUT_SECS=20` -> `payment.timeout_secs`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("MEMBERSHIP_ENROLLMENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Loads and validates in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic checks the deserializer cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.payment.validate()?;
        self.enrollment.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
