//! Unified error handling for the haul crate
//!
//! A single [`Error`] enum wraps the domain-specific errors so results can
//! cross module boundaries without losing detail. [`ErrorCategory`] classifies
//! errors for handling strategies: configuration failures abort a run before
//! any channel executes, transient source errors are contained at the smallest
//! scope, and validation/provider errors feed the retry scheduler.

use thiserror::Error;

pub use crate::review::validate::ValidationError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing credentials, disabled automation, malformed settings
    Config,
    /// Vendor API and network failures
    Vendor,
    /// Generated content failed a quality gate
    Validation,
    /// AI provider call failed
    Provider,
    /// Store and persistence errors
    Storage,
    /// Timer and schedule errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the haul crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration precondition failed; the whole run aborts fast
    #[error("Config error: {0}")]
    Config(String),

    /// Vendor responded with a non-2xx HTTP status
    #[error("Vendor HTTP {status}: {body}")]
    VendorStatus { status: u16, body: String },

    /// Review text failed a content-quality gate
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The AI provider call itself failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// A retry job reached the attempt ceiling
    #[error("Retry attempts exhausted for product {product_id} after {attempts} attempts")]
    RetryExhausted { product_id: String, attempts: u32 },

    /// Store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Schedule expression or timer error
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::VendorStatus { .. } | Self::Http(_) => ErrorCategory::Vendor,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Provider(_) => ErrorCategory::Provider,
            Self::RetryExhausted { .. } => ErrorCategory::Scheduler,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Schedule(_) => ErrorCategory::Scheduler,
            Self::Json(_) => ErrorCategory::Other,
        }
    }

    /// Check if this error should feed the retry state machine
    ///
    /// Validation and provider failures are the retry triggers; configuration
    /// and exhausted-retry errors are terminal by design.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Provider(_)
                | Self::VendorStatus { .. }
                | Self::Http(_)
        )
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::config("missing access key");
        assert_eq!(err.category(), ErrorCategory::Config);

        let err = Error::VendorStatus {
            status: 500,
            body: "rCode 500".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Vendor);

        let err = Error::Validation(ValidationError::BannedPhrase);
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::provider("timeout").is_retryable());
        assert!(Error::Validation(ValidationError::BannedPhrase).is_retryable());
        assert!(!Error::config("disabled").is_retryable());
        assert!(!Error::RetryExhausted {
            product_id: "p1".into(),
            attempts: 3
        }
        .is_retryable());
    }

    #[test]
    fn test_vendor_status_display() {
        let err = Error::VendorStatus {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(err.to_string().contains("503"));
    }
}
