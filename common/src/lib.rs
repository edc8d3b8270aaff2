//! Kursy Common Types
//!
//! Shared value types used across the Kursy workspace: currency codes,
//! currency pairs, quoted FX rates, money amounts and time helpers.

pub mod monetary;
pub mod time;

pub use monetary::*;
pub use time::*;
