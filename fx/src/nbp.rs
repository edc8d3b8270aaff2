//! Central-bank (NBP) rate-table provider.

use async_trait::async_trait;
use kursy_common::Currency;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{FxError, FxResult};
use crate::provider::{decimal_from_f64, fetch_body, http_client, ProviderRates, RateProvider};

const PROVIDER_NAME: &str = "nbp";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateTable {
    effective_date: String,
    rates: Vec<TableRate>,
}

#[derive(Debug, Deserialize)]
struct TableRate {
    code: String,
    mid: f64,
}

/// Reads the mid-rate table published by the Polish central bank.
///
/// Table mids are already zloty per one unit of foreign currency, so no
/// conversion is needed.
pub struct NbpTableProvider {
    client: Client,
    config: ProviderConfig,
    table: String,
}

impl NbpTableProvider {
    /// Create a provider reading `table` ("A" or "B").
    pub fn new(config: ProviderConfig, table: impl Into<String>) -> FxResult<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            config,
            table: table.into(),
        })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/exchangerates/tables/{}/?format=json",
            self.config.base_url, self.table
        )
    }
}

/// Parse a table response body.
pub fn parse_table(body: &str) -> FxResult<ProviderRates> {
    let tables: Vec<RateTable> = serde_json::from_str(body)
        .map_err(|e| FxError::parse(PROVIDER_NAME, e.to_string()))?;

    let table = tables
        .into_iter()
        .next()
        .ok_or_else(|| FxError::parse(PROVIDER_NAME, "no rate table in response"))?;

    let mut rates = std::collections::BTreeMap::new();
    for entry in table.rates {
        let currency = Currency::new(entry.code);
        if !currency.is_well_formed() {
            return Err(FxError::parse(
                PROVIDER_NAME,
                format!("malformed currency code '{}'", currency),
            ));
        }

        let mid = decimal_from_f64(entry.mid).ok_or_else(|| {
            FxError::parse(PROVIDER_NAME, format!("non-finite mid for {}", currency))
        })?;
        rates.insert(currency, mid);
    }

    if rates.is_empty() {
        return Err(FxError::parse(PROVIDER_NAME, "rate table is empty"));
    }

    Ok(ProviderRates {
        rates,
        fetched_at: table.effective_date,
    })
}

#[async_trait]
impl RateProvider for NbpTableProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch(&self, base: &Currency) -> FxResult<ProviderRates> {
        if *base != Currency::pln() {
            return Err(FxError::Configuration(format!(
                "central-bank tables are quoted in PLN, not {}",
                base
            )));
        }

        let url = self.table_url();
        debug!(url = %url, "Fetching central-bank table");

        let body = fetch_body(&self.client, PROVIDER_NAME, &url, self.config.timeout).await?;
        parse_table(&body)
    }
}
