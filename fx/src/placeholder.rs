//! Hard-coded rates served while every provider is down.

use std::collections::BTreeMap;

use kursy_common::Currency;
use rust_decimal::Decimal;

use crate::snapshot::{RateSnapshot, RateSource};

/// Publication date reported for placeholder snapshots.
pub const PLACEHOLDER_DATE: &str = "n/a";

/// Zloty per unit, roughly in line with recent central-bank tables.
const PLACEHOLDER_MIDS: &[(&str, i64, u32)] = &[
    ("EUR", 430, 2),
    ("USD", 400, 2),
    ("GBP", 505, 2),
    ("CHF", 455, 2),
    ("JPY", 27, 3),
    ("CZK", 17, 2),
    ("NOK", 38, 2),
    ("SEK", 38, 2),
];

/// Build the placeholder snapshot for `base`.
///
/// Only zloty figures are known; for any other base the snapshot holds the
/// base identity alone.
pub fn placeholder_snapshot(base: &Currency) -> RateSnapshot {
    let mut rates = BTreeMap::new();

    if *base == Currency::pln() {
        for (code, mantissa, scale) in PLACEHOLDER_MIDS {
            rates.insert(Currency::new(*code), Decimal::new(*mantissa, *scale));
        }
    }
    rates.insert(base.clone(), Decimal::ONE);

    RateSnapshot {
        base: base.clone(),
        rates,
        fetched_at: PLACEHOLDER_DATE.to_string(),
        source: RateSource::Placeholder,
        captured_at: kursy_common::now(),
    }
}
