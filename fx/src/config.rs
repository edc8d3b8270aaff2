//! Rate service configuration.

use std::time::Duration;

use kursy_common::constants::{provider_timeout, snapshot_ttl};
use kursy_common::{Currency, DurationExt};

use crate::error::{FxError, FxResult};

/// Configuration of a single upstream provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API, without trailing slash.
    pub base_url: String,
    /// Bound on one request, including reading the body.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Create a provider configuration.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn validate(&self, role: &str) -> FxResult<()> {
        if self.base_url.is_empty() {
            return Err(FxError::Configuration(format!(
                "{} provider URL cannot be empty",
                role
            )));
        }

        if self.timeout.is_zero() {
            return Err(FxError::Configuration(format!(
                "{} provider timeout cannot be 0",
                role
            )));
        }

        Ok(())
    }
}

/// Main rate service configuration.
#[derive(Debug, Clone)]
pub struct RateServiceConfig {
    /// Currency every rate is expressed against.
    pub base: Currency,
    /// Maximum age of the cached snapshot.
    pub ttl: Duration,
    /// Central-bank table provider.
    pub primary: ProviderConfig,
    /// Central-bank table to read ("A" holds the major currencies).
    pub nbp_table: String,
    /// Generic exchange-rate provider used when the primary fails.
    pub fallback: ProviderConfig,
    /// Serialize refreshes so concurrent callers share one fetch.
    pub single_flight: bool,
}

impl Default for RateServiceConfig {
    fn default() -> Self {
        Self {
            base: Currency::pln(),
            ttl: snapshot_ttl().as_std(),
            primary: ProviderConfig::new("https://api.nbp.pl/api", provider_timeout().as_std()),
            nbp_table: "A".to_string(),
            fallback: ProviderConfig::new(
                "https://api.exchangerate-api.com/v4",
                provider_timeout().as_std(),
            ),
            single_flight: true,
        }
    }
}

impl RateServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("KURSY_BASE_CURRENCY") {
            config.base = Currency::new(base);
        }

        if let Ok(ttl) = std::env::var("KURSY_TTL_SECS") {
            if let Ok(ttl) = ttl.parse() {
                config.ttl = Duration::from_secs(ttl);
            }
        }

        if let Ok(url) = std::env::var("KURSY_PRIMARY_URL") {
            config.primary = ProviderConfig::new(url, config.primary.timeout);
        }

        if let Ok(timeout) = std::env::var("KURSY_PRIMARY_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                config.primary.timeout = Duration::from_millis(timeout);
            }
        }

        if let Ok(table) = std::env::var("KURSY_NBP_TABLE") {
            config.nbp_table = table.to_uppercase();
        }

        if let Ok(url) = std::env::var("KURSY_FALLBACK_URL") {
            config.fallback = ProviderConfig::new(url, config.fallback.timeout);
        }

        if let Ok(timeout) = std::env::var("KURSY_FALLBACK_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse() {
                config.fallback.timeout = Duration::from_millis(timeout);
            }
        }

        if let Ok(flag) = std::env::var("KURSY_SINGLE_FLIGHT") {
            if let Ok(flag) = flag.parse() {
                config.single_flight = flag;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if !self.base.is_well_formed() {
            return Err(FxError::Configuration(format!(
                "Base currency '{}' is not a 3-letter code",
                self.base
            )));
        }

        // Central-bank tables are quoted in zloty only.
        if self.base != Currency::pln() {
            return Err(FxError::Configuration(format!(
                "Base currency must be PLN for the central-bank provider, got {}",
                self.base
            )));
        }

        if self.ttl.is_zero() {
            return Err(FxError::Configuration("TTL cannot be 0".to_string()));
        }

        if !matches!(self.nbp_table.as_str(), "A" | "B") {
            return Err(FxError::Configuration(format!(
                "Unknown central-bank table '{}'",
                self.nbp_table
            )));
        }

        self.primary.validate("Primary")?;
        self.fallback.validate("Fallback")?;

        Ok(())
    }

    /// Worst-case latency of one refresh.
    pub fn worst_case_latency(&self) -> Duration {
        self.primary.timeout + self.fallback.timeout
    }
}

/// Spreads at or above this leave no positive bid.
pub const MAX_SPREAD_BPS: u32 = 20_000;

/// Configuration for quotes served to consumers.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    /// Total bid/ask spread around mid, in basis points.
    pub spread_bps: u32,
    /// Serve placeholder rates instead of failing when providers are down.
    pub placeholder_on_failure: bool,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            spread_bps: 50,
            placeholder_on_failure: true,
        }
    }
}

impl QuoteConfig {
    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.spread_bps >= MAX_SPREAD_BPS {
            return Err(FxError::Configuration(format!(
                "Spread of {} bps must be below {} bps",
                self.spread_bps, MAX_SPREAD_BPS
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.worst_case_latency(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = RateServiceConfig::default();
        config.ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = RateServiceConfig::default();
        config.fallback.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = RateServiceConfig::default();
        config.primary.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_pln_base_rejected() {
        let config = RateServiceConfig {
            base: Currency::eur(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FxError::Configuration(_))));
    }

    #[test]
    fn test_quote_config_spread_bound() {
        assert!(QuoteConfig::default().validate().is_ok());

        let config = QuoteConfig {
            spread_bps: MAX_SPREAD_BPS - 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = QuoteConfig {
            spread_bps: MAX_SPREAD_BPS,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FxError::Configuration(_))));
    }

    #[test]
    fn test_provider_url_trailing_slash_trimmed() {
        let provider = ProviderConfig::new("http://localhost:8080/", Duration::from_secs(1));
        assert_eq!(provider.base_url, "http://localhost:8080");
    }
}
