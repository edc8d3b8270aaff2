//! Kursy FX Rate Service
//!
//! Exchange rates against a fixed base currency (PLN by default), fetched
//! from the central-bank rate table with a generic exchange-rate API as
//! fallback and held in a single time-to-live cache slot.
//!
//! # Features
//!
//! - Primary/fallback provider chain with per-provider timeouts
//! - Single-slot snapshot cache with configurable TTL
//! - Optional single-flight refresh for concurrent callers
//! - Bid/ask quotes and conversions derived from mid rates
//! - Placeholder degradation for user-facing consumers
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kursy_fx::{QuoteBoard, QuoteConfig, RateService, RateServiceConfig};
//! use kursy_common::{Currency, CurrencyPair};
//!
//! let service = Arc::new(RateService::from_config(RateServiceConfig::default())?);
//!
//! // Snapshot of all rates, cached for ten minutes
//! let snapshot = service.get_rates().await?;
//!
//! // Bid/ask for a pair
//! let board = QuoteBoard::new(service, QuoteConfig::default())?;
//! let quote = board.quote(&CurrencyPair::new(Currency::eur(), Currency::usd())).await?;
//! ```

pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod exchange_rate_api;
pub mod nbp;
pub mod placeholder;
pub mod provider;
pub mod quotes;
pub mod service;
pub mod snapshot;

pub use cache::RateSlot;
pub use config::{ProviderConfig, QuoteConfig, RateServiceConfig};
pub use conversion::{Conversion, ConversionRequest, RateSide};
pub use error::{FxError, FxResult};
pub use exchange_rate_api::ExchangeRateApiProvider;
pub use nbp::NbpTableProvider;
pub use provider::{ProviderRates, RateProvider};
pub use quotes::QuoteBoard;
pub use service::{RateService, RateServiceStats};
pub use snapshot::{RateSnapshot, RateSource};
