//! Generic exchange-rate API provider, used as fallback.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use kursy_common::Currency;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{FxError, FxResult};
use crate::provider::{decimal_from_f64, fetch_body, http_client, ProviderRates, RateProvider};

const PROVIDER_NAME: &str = "exchangerate-api";

/// Significant digits kept after inverting a quote.
const INVERTED_DIGITS: u32 = 8;

#[derive(Debug, Deserialize)]
struct LatestRates {
    #[serde(default)]
    base: Option<String>,
    date: String,
    rates: HashMap<String, f64>,
}

/// Reads `latest/{base}` from an exchangerate-api compatible service.
///
/// That API quotes foreign units per one base unit; every value is
/// inverted so the result matches the central-bank convention.
pub struct ExchangeRateApiProvider {
    client: Client,
    config: ProviderConfig,
}

impl ExchangeRateApiProvider {
    /// Create a provider with its own HTTP client.
    pub fn new(config: ProviderConfig) -> FxResult<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
        })
    }

    fn latest_url(&self, base: &Currency) -> String {
        format!("{}/latest/{}", self.config.base_url, base)
    }
}

/// Parse a `latest` response body and invert it into base units.
pub fn parse_latest(body: &str, base: &Currency) -> FxResult<ProviderRates> {
    let latest: LatestRates = serde_json::from_str(body)
        .map_err(|e| FxError::parse(PROVIDER_NAME, e.to_string()))?;

    if let Some(reported) = latest.base.as_deref().map(Currency::new) {
        if reported != *base {
            return Err(FxError::parse(
                PROVIDER_NAME,
                format!("expected base {}, got {}", base, reported),
            ));
        }
    }

    let mut rates = BTreeMap::new();
    for (code, quoted) in latest.rates {
        let currency = Currency::new(code);
        if currency == *base {
            continue;
        }

        let quoted = decimal_from_f64(quoted)
            .filter(|q| *q > Decimal::ZERO)
            .ok_or_else(|| {
                FxError::parse(PROVIDER_NAME, format!("cannot invert rate for {}", currency))
            })?;

        let inverted = Decimal::ONE
            .checked_div(quoted)
            .and_then(|rate| rate.round_sf(INVERTED_DIGITS))
            .unwrap_or(Decimal::ZERO);
        if inverted.is_zero() {
            // Below the smallest representable decimal.
            debug!(currency = %currency, "Dropping rate below inversion precision");
            continue;
        }
        rates.insert(currency, inverted.normalize());
    }

    if rates.is_empty() {
        return Err(FxError::parse(PROVIDER_NAME, "rate table is empty"));
    }

    Ok(ProviderRates {
        rates,
        fetched_at: latest.date,
    })
}

#[async_trait]
impl RateProvider for ExchangeRateApiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch(&self, base: &Currency) -> FxResult<ProviderRates> {
        let url = self.latest_url(base);
        debug!(url = %url, "Fetching fallback rates");

        let body = fetch_body(&self.client, PROVIDER_NAME, &url, self.config.timeout).await?;
        parse_latest(&body, base)
    }
}
