//! Rate provider trait and shared HTTP plumbing.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kursy_common::Currency;
use reqwest::Client;
use rust_decimal::Decimal;

use crate::error::{FxError, FxResult};

/// Rates as delivered by one provider, already in base units per one
/// unit of the foreign currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRates {
    /// Code to mid rate. The base currency may be omitted.
    pub rates: BTreeMap<Currency, Decimal>,
    /// Publication date reported by the provider.
    pub fetched_at: String,
}

/// Trait for exchange-rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the full rate table against `base`.
    async fn fetch(&self, base: &Currency) -> FxResult<ProviderRates>;
}

/// Build the HTTP client shared by the bundled providers.
pub(crate) fn http_client(timeout: Duration) -> FxResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("kursy/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FxError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// GET `url` and return the body of a successful response.
pub(crate) async fn fetch_body(
    client: &Client,
    provider: &str,
    url: &str,
    timeout: Duration,
) -> FxResult<String> {
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            FxError::ProviderTimeout {
                provider: provider.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
        } else {
            FxError::ProviderUnavailable {
                provider: provider.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FxError::ProviderHttp {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(classify)
}

/// Convert a JSON number into a decimal without binary noise.
pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    value.to_string().parse().ok()
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockBehavior, MockRateProvider};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use kursy_common::Currency;
    use parking_lot::Mutex;

    use super::{ProviderRates, RateProvider};
    use crate::error::{FxError, FxResult};

    /// Scripted outcome of a mock fetch.
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return these rates.
        Succeed(ProviderRates),
        /// Fail with the given HTTP status.
        HttpError(u16),
        /// Fail as if the body had the wrong shape.
        Malformed(String),
        /// Never answer.
        Hang,
    }

    /// Mock rate provider for testing.
    pub struct MockRateProvider {
        name: String,
        behavior: Mutex<MockBehavior>,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
    }

    impl MockRateProvider {
        /// Create a new mock provider.
        pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
            Self {
                name: name.into(),
                behavior: Mutex::new(behavior),
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        /// Mock that serves the given `(code, rate)` pairs.
        pub fn serving(name: impl Into<String>, date: &str, rates: &[(&str, rust_decimal::Decimal)]) -> Self {
            Self::new(name, MockBehavior::Succeed(Self::rates(date, rates)))
        }

        /// Build provider output from `(code, rate)` pairs.
        pub fn rates(date: &str, rates: &[(&str, rust_decimal::Decimal)]) -> ProviderRates {
            ProviderRates {
                rates: rates
                    .iter()
                    .map(|(code, rate)| (Currency::new(*code), *rate))
                    .collect(),
                fetched_at: date.to_string(),
            }
        }

        /// Change what subsequent fetches do.
        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock() = behavior;
        }

        /// Delay every answer.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Number of fetches so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for MockRateProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _base: &Currency) -> FxResult<ProviderRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let behavior = self.behavior.lock().clone();
            match behavior {
                MockBehavior::Succeed(rates) => Ok(rates),
                MockBehavior::HttpError(status) => Err(FxError::ProviderHttp {
                    provider: self.name.clone(),
                    status,
                }),
                MockBehavior::Malformed(reason) => Err(FxError::parse(&self.name, reason)),
                MockBehavior::Hang => std::future::pending().await,
            }
        }
    }
}
