//! Errors raised while loading or checking configuration

use thiserror::Error;

/// Startup failure: the environment could not be read or was rejected
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration rejected: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// A loaded value that is semantically wrong
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required setting {0}")]
    MissingRequired(&'static str),

    #[error("Database URL must start with postgres:// or postgresql://")]
    InvalidDatabaseUrl,

    #[error("Database min_connections is larger than max_connections")]
    InvalidPoolSize,

    #[error("Database max_connections may not exceed 100")]
    PoolSizeTooLarge,

    #[error("Gateway URL must use HTTP or HTTPS")]
    InvalidGatewayUrl,

    #[error("Gateway timeout must be between 1 and 300 seconds")]
    InvalidGatewayTimeout,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
