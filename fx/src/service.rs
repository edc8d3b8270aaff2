//! The rate cache service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kursy_common::Currency;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::RateSlot;
use crate::config::RateServiceConfig;
use crate::error::{FxError, FxResult};
use crate::exchange_rate_api::ExchangeRateApiProvider;
use crate::nbp::NbpTableProvider;
use crate::provider::RateProvider;
use crate::snapshot::{RateSnapshot, RateSource};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    refreshes: AtomicU64,
    primary_failures: AtomicU64,
    fallback_served: AtomicU64,
    total_failures: AtomicU64,
}

/// Rates against one base currency, cached for a TTL and refreshed from a
/// primary provider with a single fallback.
pub struct RateService {
    primary: Arc<dyn RateProvider>,
    fallback: Arc<dyn RateProvider>,
    slot: RateSlot,
    /// Held for the duration of a single-flight refresh; holds the failure
    /// of the last completed one.
    refresh_lock: Mutex<Option<FxError>>,
    /// Completed single-flight refreshes.
    refresh_generation: AtomicU64,
    counters: Counters,
    config: RateServiceConfig,
}

impl RateService {
    /// Create a service over the given providers.
    pub fn new(
        primary: Arc<dyn RateProvider>,
        fallback: Arc<dyn RateProvider>,
        config: RateServiceConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            slot: RateSlot::new(),
            refresh_lock: Mutex::new(None),
            refresh_generation: AtomicU64::new(0),
            counters: Counters::default(),
            config,
        }
    }

    /// Create a service talking to the configured central-bank and
    /// fallback endpoints.
    pub fn from_config(config: RateServiceConfig) -> FxResult<Self> {
        config.validate()?;

        let primary = NbpTableProvider::new(config.primary.clone(), config.nbp_table.clone())?;
        let fallback = ExchangeRateApiProvider::new(config.fallback.clone())?;

        Ok(Self::new(Arc::new(primary), Arc::new(fallback), config))
    }

    /// Base currency of every snapshot.
    pub fn base(&self) -> &Currency {
        &self.config.base
    }

    /// Service configuration.
    pub fn config(&self) -> &RateServiceConfig {
        &self.config
    }

    /// Get the current rates.
    ///
    /// Serves the cached snapshot while it is younger than the TTL.
    /// Otherwise asks the primary provider, then the fallback, each at most
    /// once and each bounded by its timeout. When both fail the error is
    /// returned even if an expired snapshot is still held.
    #[instrument(skip(self), fields(base = %self.config.base))]
    pub async fn get_rates(&self) -> FxResult<Arc<RateSnapshot>> {
        if let Some(snapshot) = self.slot.fresh(self.config.ttl) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }

        if !self.config.single_flight {
            return self.refresh().await;
        }

        let seen = self.refresh_generation.load(Ordering::Acquire);
        let mut last_failure = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(snapshot) = self.slot.fresh(self.config.ttl) {
            debug!("Refresh already done by a concurrent caller");
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(snapshot);
        }

        // The refresh we waited on failed; its outcome is ours too.
        if self.refresh_generation.load(Ordering::Acquire) != seen {
            if let Some(e) = last_failure.as_ref() {
                debug!(error = %e, "Sharing failure of a concurrent refresh");
                return Err(e.clone());
            }
        }

        let result = self.refresh().await;
        *last_failure = result.as_ref().err().cloned();
        self.refresh_generation.fetch_add(1, Ordering::Release);
        result
    }

    /// Snapshot currently held, regardless of age.
    pub fn cached(&self) -> Option<Arc<RateSnapshot>> {
        self.slot.latest()
    }

    /// Make the next [`RateService::get_rates`] call refetch.
    pub fn invalidate(&self) {
        self.slot.invalidate();
    }

    /// Get service statistics.
    pub fn stats(&self) -> RateServiceStats {
        RateServiceStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            primary_failures: self.counters.primary_failures.load(Ordering::Relaxed),
            fallback_served: self.counters.fallback_served.load(Ordering::Relaxed),
            total_failures: self.counters.total_failures.load(Ordering::Relaxed),
        }
    }

    async fn refresh(&self) -> FxResult<Arc<RateSnapshot>> {
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);

        let primary_error = match self
            .attempt(self.primary.as_ref(), self.config.primary.timeout, RateSource::Primary)
            .await
        {
            Ok(snapshot) => return Ok(self.store(snapshot)),
            Err(e) => {
                self.counters.primary_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    provider = self.primary.name(),
                    error = %e,
                    "Primary provider failed, trying fallback"
                );
                e
            }
        };

        match self
            .attempt(self.fallback.as_ref(), self.config.fallback.timeout, RateSource::Fallback)
            .await
        {
            Ok(snapshot) => {
                self.counters.fallback_served.fetch_add(1, Ordering::Relaxed);
                Ok(self.store(snapshot))
            }
            Err(fallback_error) => {
                self.counters.total_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    primary = %primary_error,
                    fallback = %fallback_error,
                    stale_available = !self.slot.is_empty(),
                    "All rate providers failed"
                );
                Err(FxError::AllProvidersFailed {
                    primary: Box::new(primary_error),
                    fallback: Box::new(fallback_error),
                })
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn RateProvider,
        timeout: Duration,
        source: RateSource,
    ) -> FxResult<RateSnapshot> {
        let data = tokio::time::timeout(timeout, provider.fetch(&self.config.base))
            .await
            .map_err(|_| FxError::ProviderTimeout {
                provider: provider.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        RateSnapshot::from_provider(self.config.base.clone(), provider.name(), data, source)
    }

    fn store(&self, snapshot: RateSnapshot) -> Arc<RateSnapshot> {
        info!(
            source = %snapshot.source,
            fetched_at = %snapshot.fetched_at,
            currencies = snapshot.foreign_count(),
            "Rate snapshot refreshed"
        );
        self.slot.replace(snapshot)
    }
}

/// Service statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateServiceStats {
    /// Calls answered from the cache.
    pub hits: u64,
    /// Calls that went to the providers.
    pub refreshes: u64,
    /// Refreshes where the primary provider failed.
    pub primary_failures: u64,
    /// Refreshes answered by the fallback provider.
    pub fallback_served: u64,
    /// Refreshes where every provider failed.
    pub total_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MockBehavior, MockRateProvider};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Instant;

    fn test_config() -> RateServiceConfig {
        let mut config = RateServiceConfig::default();
        config.primary.timeout = Duration::from_millis(100);
        config.fallback.timeout = Duration::from_millis(100);
        config
    }

    fn setup(config: RateServiceConfig) -> (RateService, Arc<MockRateProvider>, Arc<MockRateProvider>) {
        let primary = Arc::new(MockRateProvider::serving(
            "nbp",
            "2024-03-01",
            &[("EUR", dec!(4.3191)), ("USD", dec!(3.9803))],
        ));
        let fallback = Arc::new(MockRateProvider::serving(
            "exchangerate-api",
            "2024-03-02",
            &[("EUR", dec!(4.25)), ("USD", dec!(4))],
        ));
        let service = RateService::new(primary.clone(), fallback.clone(), config);
        (service, primary, fallback)
    }

    #[tokio::test]
    async fn test_get_rates_from_primary() {
        let (service, primary, fallback) = setup(test_config());

        let snapshot = service.get_rates().await.unwrap();

        assert_eq!(snapshot.source, RateSource::Primary);
        assert_eq!(snapshot.fetched_at, "2024-03-01");
        assert_eq!(snapshot.rate(&Currency::eur()), Some(dec!(4.3191)));
        assert_eq!(snapshot.rate(&Currency::pln()), Some(Decimal::ONE));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit() {
        let (service, primary, _) = setup(test_config());

        let first = service.get_rates().await.unwrap();
        let second = service.get_rates().await.unwrap();

        assert_eq!(primary.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.fetched_at, second.fetched_at);
        assert_eq!(first.source, second.source);
        assert_eq!(first.rates, second.rates);

        let stats = service.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.refreshes, 1);
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let config = RateServiceConfig {
            ttl: Duration::from_millis(50),
            ..test_config()
        };
        let (service, primary, _) = setup(config);

        let first = service.get_rates().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        primary.set_behavior(MockBehavior::Succeed(MockRateProvider::rates(
            "2024-03-04",
            &[("EUR", dec!(4.31))],
        )));
        let second = service.get_rates().await.unwrap();

        assert_eq!(primary.calls(), 2);
        assert!(second.captured_at > first.captured_at);
        assert_eq!(second.fetched_at, "2024-03-04");
        assert_eq!(second.rate(&Currency::usd()), None);
    }

    #[tokio::test]
    async fn test_fallback_on_primary_http_error() {
        let (service, primary, fallback) = setup(test_config());
        primary.set_behavior(MockBehavior::HttpError(503));

        let snapshot = service.get_rates().await.unwrap();

        assert_eq!(snapshot.source, RateSource::Fallback);
        assert_eq!(snapshot.fetched_at, "2024-03-02");
        assert_eq!(snapshot.rate(&Currency::usd()), Some(dec!(4)));
        assert_eq!(snapshot.rate(&Currency::pln()), Some(Decimal::ONE));
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(service.stats().fallback_served, 1);
    }

    #[tokio::test]
    async fn test_fallback_on_malformed_primary() {
        let (service, primary, fallback) = setup(test_config());
        primary.set_behavior(MockBehavior::Malformed("missing rate table".to_string()));

        let snapshot = service.get_rates().await.unwrap();

        assert_eq!(snapshot.source, RateSource::Fallback);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_on_empty_primary_table() {
        let (service, primary, _) = setup(test_config());
        primary.set_behavior(MockBehavior::Succeed(MockRateProvider::rates("2024-03-01", &[])));

        let snapshot = service.get_rates().await.unwrap();
        assert_eq!(snapshot.source, RateSource::Fallback);
    }

    #[tokio::test]
    async fn test_total_failure() {
        let (service, primary, fallback) = setup(test_config());
        primary.set_behavior(MockBehavior::HttpError(500));
        fallback.set_behavior(MockBehavior::Malformed("no rates".to_string()));

        let result = service.get_rates().await;

        match result {
            Err(FxError::AllProvidersFailed { primary, fallback }) => {
                assert!(matches!(*primary, FxError::ProviderHttp { status: 500, .. }));
                assert!(matches!(*fallback, FxError::ProviderParse { .. }));
            }
            other => panic!("expected AllProvidersFailed, got {:?}", other),
        }
        assert!(service.cached().is_none());
        assert_eq!(service.stats().total_failures, 1);
    }

    #[tokio::test]
    async fn test_total_failure_does_not_serve_stale_snapshot() {
        let config = RateServiceConfig {
            ttl: Duration::from_millis(30),
            ..test_config()
        };
        let (service, primary, fallback) = setup(config);

        service.get_rates().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        primary.set_behavior(MockBehavior::HttpError(500));
        fallback.set_behavior(MockBehavior::HttpError(500));

        let result = service.get_rates().await;
        assert!(matches!(result, Err(FxError::AllProvidersFailed { .. })));

        // The expired snapshot is left in place for callers that want it.
        let stale = service.cached().unwrap();
        assert_eq!(stale.source, RateSource::Primary);
    }

    #[tokio::test]
    async fn test_timeout_bound() {
        let (service, primary, fallback) = setup(test_config());
        primary.set_behavior(MockBehavior::Hang);
        fallback.set_behavior(MockBehavior::Hang);

        let started = Instant::now();
        let result = service.get_rates().await;
        let elapsed = started.elapsed();

        match result {
            Err(FxError::AllProvidersFailed { primary, fallback }) => {
                assert!(matches!(*primary, FxError::ProviderTimeout { timeout_ms: 100, .. }));
                assert!(matches!(*fallback, FxError::ProviderTimeout { .. }));
            }
            other => panic!("expected AllProvidersFailed, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_slow_primary_moves_to_fallback() {
        let (service, primary, _) = setup(test_config());
        primary.set_delay(Duration::from_secs(30));

        let snapshot = service.get_rates().await.unwrap();
        assert_eq!(snapshot.source, RateSource::Fallback);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (service, primary, _) = setup(test_config());

        service.get_rates().await.unwrap();
        service.invalidate();
        service.get_rates().await.unwrap();

        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_concurrent_refreshes() {
        let (service, primary, _) = setup(test_config());
        primary.set_delay(Duration::from_millis(20));
        let service = Arc::new(service);

        let calls = (0..8).map(|_| {
            let service = service.clone();
            async move { service.get_rates().await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_outage_keeps_timeout_bound() {
        let (service, primary, fallback) = setup(test_config());
        primary.set_behavior(MockBehavior::Hang);
        fallback.set_behavior(MockBehavior::Hang);
        let service = Arc::new(service);

        let started = Instant::now();
        let calls = (0..4).map(|_| {
            let service = service.clone();
            async move {
                let result = service.get_rates().await;
                (result, started.elapsed())
            }
        });
        let results = futures::future::join_all(calls).await;

        for (result, elapsed) in &results {
            assert!(matches!(result, Err(FxError::AllProvidersFailed { .. })));
            assert!(*elapsed < Duration::from_millis(350), "took {:?}", elapsed);
        }
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(service.stats().total_failures, 1);
    }

    #[tokio::test]
    async fn test_single_flight_retries_after_shared_failure() {
        let (service, primary, fallback) = setup(test_config());
        primary.set_behavior(MockBehavior::HttpError(500));
        fallback.set_behavior(MockBehavior::HttpError(500));

        assert!(service.get_rates().await.is_err());

        primary.set_behavior(MockBehavior::Succeed(MockRateProvider::rates(
            "2024-03-04",
            &[("EUR", dec!(4.31))],
        )));
        let snapshot = service.get_rates().await.unwrap();

        assert_eq!(snapshot.fetched_at, "2024-03-04");
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn test_without_single_flight_each_caller_may_fetch() {
        let config = RateServiceConfig {
            single_flight: false,
            ..test_config()
        };
        let (service, primary, _) = setup(config);
        primary.set_delay(Duration::from_millis(20));

        let (a, b) = tokio::join!(service.get_rates(), service.get_rates());

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(primary.calls(), 2);
    }
}
