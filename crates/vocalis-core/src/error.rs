//! Unified error handling for the Vocalis credit ledger
//!
//! `AppError` carries only transient system faults (store unreachable,
//! external API timeout, bad configuration). Business rejections such as
//! `insufficient_balance` or `debt_limit_exceeded` are structured results
//! returned in `Ok(..)` by the services, never error variants, so callers
//! can apply their own retry policy to `Err` without inspecting it.

use thiserror::Error;

/// Main application error type
///
/// All transient failures in the application should be converted to this type.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== External Service Errors ====================
    #[error("Provider API error: {0}")]
    Provider(String),

    #[error("Provider request timed out after {0}ms")]
    ProviderTimeout(u64),

    #[error("Payment gateway error: {0}")]
    Payment(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the error code for structured logging
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Provider(_) => "provider_error",
            AppError::ProviderTimeout(_) => "provider_timeout",
            AppError::Payment(_) => "payment_error",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether a retry of the same request may succeed.
    ///
    /// Configuration and serialization faults are deterministic; everything
    /// else reaches out to an external system and may clear on its own.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            AppError::Config(_) | AppError::Serialization(_) | AppError::Internal(_)
        )
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
