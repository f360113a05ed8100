//! Tenantmeter error types.

use thiserror::Error;

/// Errors that can occur in the entitlement and metering engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No license exists for the tenant.
    #[error("No license found for tenant '{tenant}'")]
    NotFound {
        /// The tenant that has no license.
        tenant: String,
    },

    /// A license already exists for the tenant.
    #[error("Tenant '{tenant}' already has a subscription")]
    DuplicateSubscription {
        /// The tenant that already holds a license.
        tenant: String,
    },

    /// The same module key appeared twice in a subscription request.
    #[error("Duplicate module '{module}' in subscription request")]
    DuplicateModule {
        /// The repeated module key.
        module: String,
    },

    /// The module is not part of the tenant's license.
    #[error("Module '{module}' is not licensed for tenant '{tenant}'")]
    ModuleNotLicensed {
        /// The tenant whose license was checked.
        tenant: String,
        /// The module missing from the license.
        module: String,
    },

    /// A string did not name a known module key.
    #[error("Unknown module key: {0}")]
    InvalidModuleKey(String),

    /// A string did not name a known usage type.
    #[error("Unknown usage type: {0}")]
    InvalidUsageType(String),

    /// A usage amount must be a positive integer.
    #[error("Usage amount must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: u64,
    },

    /// A period string was not a valid `YYYY-MM` key.
    #[error("Invalid period key: {0}")]
    InvalidPeriod(String),

    /// Transient storage failure. No partial usage mutation occurred,
    /// so the caller may safely retry.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}
