//! Rate snapshots served to consumers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Duration;
use kursy_common::{Currency, Timestamp};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{FxError, FxResult};
use crate::provider::ProviderRates;

/// Which provider produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    /// Central-bank rate table.
    Primary,
    /// Generic exchange-rate API.
    Fallback,
    /// Hard-coded values served while every provider is down. Never cached.
    Placeholder,
}

impl RateSource {
    /// Lower-case name used in logs and quote sources.
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::Primary => "primary",
            RateSource::Fallback => "fallback",
            RateSource::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable set of rates against one base currency.
///
/// Every value is the mid rate in base units for one unit of the foreign
/// currency, so `rates[base]` is always exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    /// Currency the rates are expressed against.
    pub base: Currency,
    /// Code to mid rate.
    pub rates: BTreeMap<Currency, Decimal>,
    /// Publication date reported by the provider.
    pub fetched_at: String,
    /// Provider that produced the data.
    pub source: RateSource,
    /// Wall-clock time the snapshot was stored, used for expiry only.
    #[serde(skip)]
    pub captured_at: Timestamp,
}

impl RateSnapshot {
    /// Build a snapshot from provider output, enforcing the base identity.
    pub fn from_provider(
        base: Currency,
        provider: &str,
        data: ProviderRates,
        source: RateSource,
    ) -> FxResult<Self> {
        let ProviderRates { mut rates, fetched_at } = data;

        if fetched_at.trim().is_empty() {
            return Err(FxError::parse(provider, "missing publication date"));
        }

        if let Some((code, rate)) = rates.iter().find(|(_, rate)| **rate <= Decimal::ZERO) {
            return Err(FxError::parse(
                provider,
                format!("non-positive rate {} for {}", rate, code),
            ));
        }

        match rates.get(&base) {
            Some(rate) if *rate != Decimal::ONE => {
                return Err(FxError::parse(
                    provider,
                    format!("base {} quoted at {} instead of 1", base, rate),
                ));
            }
            _ => {}
        }

        rates.insert(base.clone(), Decimal::ONE);

        if rates.len() < 2 {
            return Err(FxError::parse(provider, "rate table is empty"));
        }

        Ok(Self {
            base,
            rates,
            fetched_at,
            source,
            captured_at: kursy_common::now(),
        })
    }

    /// Mid rate of `currency` in base units.
    pub fn rate(&self, currency: &Currency) -> Option<Decimal> {
        self.rates.get(currency).copied()
    }

    /// Number of foreign currencies in the snapshot.
    pub fn foreign_count(&self) -> usize {
        self.rates.len().saturating_sub(1)
    }

    /// Time since the snapshot was stored.
    pub fn age(&self) -> Duration {
        kursy_common::age_of(self.captured_at)
    }

    /// Whether the snapshot is younger than `ttl`.
    pub fn is_fresh(&self, ttl: std::time::Duration) -> bool {
        match Duration::from_std(ttl) {
            Ok(ttl) => kursy_common::is_within(self.captured_at, ttl),
            Err(_) => true,
        }
    }
}
