//! FX service error types.

use kursy_common::CurrencyPair;
use thiserror::Error;

/// Errors that can occur in the rate service.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Provider did not answer within its bound.
    #[error("Provider {provider} timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    /// Provider answered with a non-success status code.
    #[error("Provider {provider} returned HTTP {status}")]
    ProviderHttp { provider: String, status: u16 },

    /// Provider could not be reached at all.
    #[error("Provider {provider} unreachable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// Provider response did not match the expected shape.
    #[error("Provider {provider} sent an unexpected response: {reason}")]
    ProviderParse { provider: String, reason: String },

    /// Both the primary and the fallback provider failed.
    #[error("All rate providers failed (primary: {primary}; fallback: {fallback})")]
    AllProvidersFailed {
        primary: Box<FxError>,
        fallback: Box<FxError>,
    },

    /// Rate not available for the requested currency pair.
    #[error("Rate not available for {0}")]
    RateNotAvailable(CurrencyPair),

    /// Amount cannot be converted.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid service configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    pub(crate) fn parse(provider: &str, reason: impl Into<String>) -> Self {
        FxError::ProviderParse {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came out of a single provider attempt.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            FxError::ProviderTimeout { .. }
                | FxError::ProviderHttp { .. }
                | FxError::ProviderUnavailable { .. }
                | FxError::ProviderParse { .. }
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            FxError::ProviderHttp { .. } => "PROVIDER_HTTP_ERROR",
            FxError::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            FxError::ProviderParse { .. } => "PROVIDER_PARSE_ERROR",
            FxError::AllProvidersFailed { .. } => "ALL_PROVIDERS_FAILED",
            FxError::RateNotAvailable(_) => "RATE_NOT_AVAILABLE",
            FxError::InvalidAmount(_) => "INVALID_AMOUNT",
            FxError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
