//! Monetary types: currency codes, pairs, quoted rates and amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }

    /// Round to the currency's standard decimal places.
    pub fn round(&self) -> Self {
        let places = self.currency.decimal_places();
        Self {
            value: self.value.round_dp(places),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// ISO 4217 currency code, always stored upper-case.
///
/// Deserialization goes through [`Currency::new`], so codes read from
/// provider payloads are normalized too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Whether the code looks like an ISO 4217 alphabetic code.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 3 && self.0.chars().all(|c| c.is_ascii_uppercase())
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "HUF" | "ISK" | "CLP" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    /// Polish zloty, the default base currency.
    pub fn pln() -> Self {
        Self::new("PLN")
    }

    /// US dollar.
    pub fn usd() -> Self {
        Self::new("USD")
    }

    /// Euro.
    pub fn eur() -> Self {
        Self::new("EUR")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A currency pair for FX operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (being bought/sold).
    pub base: Currency,
    /// Quote currency (pricing currency).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Quoted FX rate between two currencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRate {
    /// The currency pair.
    pub pair: CurrencyPair,
    /// Bid price (what the desk pays for one unit of base).
    pub bid: Decimal,
    /// Ask price (what the desk charges for one unit of base).
    pub ask: Decimal,
    /// Mid-market rate.
    pub mid: Decimal,
    /// When this rate was quoted.
    pub quoted_at: chrono::DateTime<chrono::Utc>,
    /// When this rate stops being served.
    pub valid_until: chrono::DateTime<chrono::Utc>,
    /// Rate source.
    pub source: String,
}

impl FxRate {
    /// Create a rate around a mid price with a total spread in basis points,
    /// split evenly between bid and ask.
    ///
    /// Returns `None` when the arithmetic overflows.
    pub fn from_mid(
        pair: CurrencyPair,
        mid: Decimal,
        spread_bps: u32,
        valid_for_seconds: i64,
        source: impl Into<String>,
    ) -> Option<Self> {
        let half = mid
            .checked_mul(Decimal::from(spread_bps))?
            .checked_div(Decimal::from(20_000))?;
        let now = chrono::Utc::now();
        Some(Self {
            pair,
            bid: mid.checked_sub(half)?,
            ask: mid.checked_add(half)?,
            mid,
            quoted_at: now,
            valid_until: now + chrono::Duration::seconds(valid_for_seconds),
            source: source.into(),
        })
    }

    /// Check if the rate is still valid.
    pub fn is_valid(&self) -> bool {
        chrono::Utc::now() < self.valid_until
    }
}
