//! Time utilities for rate caching.

use chrono::{DateTime, Duration, Utc};

/// Rate service timing constants.
pub mod constants {
    use super::Duration;

    /// Lifetime of a cached rate snapshot (10 minutes).
    pub fn snapshot_ttl() -> Duration {
        Duration::minutes(10)
    }

    /// Per-provider request bound (5 seconds).
    pub fn provider_timeout() -> Duration {
        Duration::seconds(5)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Age of a timestamp relative to now. Future timestamps have zero age.
pub fn age_of(timestamp: Timestamp) -> Duration {
    let age = now() - timestamp;
    if age < Duration::zero() {
        Duration::zero()
    } else {
        age
    }
}

/// Check whether something captured at `timestamp` is still within `ttl`.
pub fn is_within(timestamp: Timestamp, ttl: Duration) -> bool {
    age_of(timestamp) < ttl
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    /// Convert to a `std` duration; negative values become zero.
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within() {
        let recent = now() - Duration::seconds(10);
        assert!(is_within(recent, constants::snapshot_ttl()));

        let old = now() - Duration::minutes(11);
        assert!(!is_within(old, constants::snapshot_ttl()));
    }

    #[test]
    fn test_future_timestamp_has_zero_age() {
        let future = now() + Duration::seconds(30);
        assert_eq!(age_of(future), Duration::zero());
    }

    #[test]
    fn test_negative_duration_as_std() {
        assert_eq!(Duration::seconds(-5).as_std(), std::time::Duration::ZERO);
        assert_eq!(
            constants::provider_timeout().as_std(),
            std::time::Duration::from_secs(5)
        );
    }
}
