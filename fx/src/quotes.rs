//! Bid/ask quotes and conversions built on the rate service.

use std::sync::Arc;

use kursy_common::{CurrencyPair, FxRate, Money};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::config::{QuoteConfig, MAX_SPREAD_BPS};
use crate::conversion::{Conversion, ConversionRequest};
use crate::error::{FxError, FxResult};
use crate::placeholder::placeholder_snapshot;
use crate::service::RateService;
use crate::snapshot::RateSnapshot;

/// Quote a pair from a snapshot.
///
/// Both legs are converted through the base currency: one unit of
/// `pair.base` costs `rate(base) / rate(quote)` units of `pair.quote`.
/// The quote stays valid for as long as the snapshot has left to live.
pub fn quote_from_snapshot(
    snapshot: &RateSnapshot,
    pair: &CurrencyPair,
    spread_bps: u32,
    ttl: std::time::Duration,
) -> FxResult<FxRate> {
    if spread_bps >= MAX_SPREAD_BPS {
        return Err(FxError::Configuration(format!(
            "Spread of {} bps must be below {} bps",
            spread_bps, MAX_SPREAD_BPS
        )));
    }

    let base_leg = snapshot
        .rate(&pair.base)
        .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))?;
    let quote_leg = snapshot
        .rate(&pair.quote)
        .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))?;

    if quote_leg <= Decimal::ZERO {
        return Err(FxError::RateNotAvailable(pair.clone()));
    }

    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
    let remaining = (ttl - snapshot.age()).num_seconds().max(0);

    base_leg
        .checked_div(quote_leg)
        .and_then(|mid| {
            FxRate::from_mid(pair.clone(), mid, spread_bps, remaining, snapshot.source.as_str())
        })
        .ok_or_else(|| FxError::RateNotAvailable(pair.clone()))
}

/// Serves quotes and conversions for user-facing handlers.
pub struct QuoteBoard {
    service: Arc<RateService>,
    config: QuoteConfig,
}

impl QuoteBoard {
    /// Create a new quote board.
    pub fn new(service: Arc<RateService>, config: QuoteConfig) -> FxResult<Self> {
        config.validate()?;
        Ok(Self { service, config })
    }

    /// Underlying rate service.
    pub fn service(&self) -> &Arc<RateService> {
        &self.service
    }

    /// Current snapshot, or the placeholder table when providers are down.
    pub async fn snapshot_or_placeholder(&self) -> Arc<RateSnapshot> {
        match self.service.get_rates().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Serving placeholder rates");
                Arc::new(placeholder_snapshot(self.service.base()))
            }
        }
    }

    /// Snapshot quotes are computed from, honouring `placeholder_on_failure`.
    pub async fn snapshot(&self) -> FxResult<Arc<RateSnapshot>> {
        if self.config.placeholder_on_failure {
            Ok(self.snapshot_or_placeholder().await)
        } else {
            self.service.get_rates().await
        }
    }

    /// Get a bid/ask quote for a currency pair.
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn quote(&self, pair: &CurrencyPair) -> FxResult<FxRate> {
        let snapshot = self.snapshot().await?;
        quote_from_snapshot(&snapshot, pair, self.config.spread_bps, self.service.config().ttl)
    }

    /// Quote several pairs from one snapshot, skipping unknown currencies.
    pub async fn quotes(&self, pairs: &[CurrencyPair]) -> FxResult<Vec<FxRate>> {
        let snapshot = self.snapshot().await?;
        let ttl = self.service.config().ttl;

        let quotes = pairs
            .iter()
            .filter_map(|pair| {
                match quote_from_snapshot(&snapshot, pair, self.config.spread_bps, ttl) {
                    Ok(rate) => Some(rate),
                    Err(e) => {
                        warn!(pair = %pair, error = %e, "Skipping pair");
                        None
                    }
                }
            })
            .collect();

        Ok(quotes)
    }

    /// Convert an amount using the requested side of the quote.
    #[instrument(skip(self), fields(
        from_currency = %request.amount.currency,
        to_currency = %request.target_currency,
        amount = %request.amount.value
    ))]
    pub async fn convert(&self, request: ConversionRequest) -> FxResult<Conversion> {
        if request.amount.is_negative() {
            return Err(FxError::InvalidAmount(format!(
                "cannot convert negative amount {}",
                request.amount
            )));
        }

        let rate = self.quote(&request.pair()).await?;

        let conversion_rate = request.rate_side.get_rate(&rate);
        let value = request
            .amount
            .value
            .checked_mul(conversion_rate)
            .ok_or_else(|| FxError::InvalidAmount(format!("{} is too large to convert", request.amount)))?;
        let output = Money::new(value, request.target_currency.clone()).round();

        let conversion = Conversion::new(request.amount, output, rate, request.rate_side);

        info!(
            conversion_id = %conversion.id,
            effective_rate = %conversion.effective_rate(),
            "Conversion completed"
        );

        Ok(conversion)
    }
}
