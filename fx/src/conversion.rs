//! Currency conversion types.

use chrono::{DateTime, Utc};
use kursy_common::{Currency, CurrencyPair, FxRate, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a completed currency conversion.
#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    /// Unique conversion ID.
    pub id: Uuid,
    /// Input amount.
    pub input: Money,
    /// Output amount.
    pub output: Money,
    /// Quote used for conversion.
    pub rate: FxRate,
    /// Side of the quote applied.
    pub side: RateSide,
    /// When the conversion was executed.
    pub executed_at: DateTime<Utc>,
}

impl Conversion {
    /// Create a new conversion record.
    pub fn new(input: Money, output: Money, rate: FxRate, side: RateSide) -> Self {
        Self {
            id: Uuid::now_v7(),
            input,
            output,
            rate,
            side,
            executed_at: Utc::now(),
        }
    }

    /// Get the effective rate used.
    pub fn effective_rate(&self) -> Decimal {
        if self.input.value.is_zero() {
            return Decimal::ZERO;
        }
        self.output.value / self.input.value
    }

    /// Get the currency pair.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.input.currency.clone(), self.output.currency.clone())
    }
}

/// Request to perform a conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Amount to convert.
    pub amount: Money,
    /// Target currency.
    pub target_currency: Currency,
    /// Whether to use bid or ask rate.
    pub rate_side: RateSide,
}

impl ConversionRequest {
    /// Create a new conversion request at mid.
    pub fn new(amount: Money, target_currency: Currency) -> Self {
        Self {
            amount,
            target_currency,
            rate_side: RateSide::Mid,
        }
    }

    /// Use bid rate (for selling the amount's currency).
    pub fn at_bid(mut self) -> Self {
        self.rate_side = RateSide::Bid;
        self
    }

    /// Use ask rate (for buying the amount's currency).
    pub fn at_ask(mut self) -> Self {
        self.rate_side = RateSide::Ask;
        self
    }

    /// Pair quoted for this request.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.amount.currency.clone(), self.target_currency.clone())
    }
}

/// Which side of the rate to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSide {
    /// Use bid price.
    Bid,
    /// Use ask price.
    Ask,
    /// Use mid-market rate.
    Mid,
}

impl RateSide {
    /// Get the rate value from an FxRate.
    pub fn get_rate(&self, rate: &FxRate) -> Decimal {
        match self {
            RateSide::Bid => rate.bid,
            RateSide::Ask => rate.ask,
            RateSide::Mid => rate.mid,
        }
    }
}

impl std::str::FromStr for RateSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bid" => Ok(RateSide::Bid),
            "ask" => Ok(RateSide::Ask),
            "mid" => Ok(RateSide::Mid),
            other => Err(format!("unknown rate side '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur_pln() -> FxRate {
        FxRate::from_mid(
            CurrencyPair::new(Currency::eur(), Currency::pln()),
            dec!(4.30),
            100,
            30,
            "TEST",
        )
        .unwrap()
    }

    #[test]
    fn test_conversion_effective_rate() {
        let input = Money::new(dec!(1000), Currency::eur());
        let output = Money::new(dec!(4300), Currency::pln());

        let conversion = Conversion::new(input, output, eur_pln(), RateSide::Mid);

        assert_eq!(conversion.effective_rate(), dec!(4.3));
        assert_eq!(
            conversion.pair(),
            CurrencyPair::new(Currency::eur(), Currency::pln())
        );
    }

    #[test]
    fn test_rate_side() {
        let rate = eur_pln();

        assert_eq!(RateSide::Bid.get_rate(&rate), dec!(4.2785));
        assert_eq!(RateSide::Ask.get_rate(&rate), dec!(4.3215));
        assert_eq!(RateSide::Mid.get_rate(&rate), dec!(4.30));
    }

    #[test]
    fn test_rate_side_from_str() {
        assert_eq!("BID".parse::<RateSide>(), Ok(RateSide::Bid));
        assert_eq!("mid".parse::<RateSide>(), Ok(RateSide::Mid));
        assert!("spot".parse::<RateSide>().is_err());
    }

    #[test]
    fn test_request_sides() {
        let request = ConversionRequest::new(Money::new(dec!(100), Currency::usd()), Currency::pln())
            .at_ask();

        assert_eq!(request.rate_side, RateSide::Ask);
        assert_eq!(request.pair().to_string(), "USD/PLN");
    }
}
