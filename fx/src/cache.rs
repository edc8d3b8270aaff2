//! Single-slot snapshot cache with TTL support.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::snapshot::RateSnapshot;

/// Cached snapshot entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<RateSnapshot>,
    invalidated: bool,
}

impl CacheEntry {
    fn is_valid(&self, ttl: Duration) -> bool {
        !self.invalidated && self.snapshot.is_fresh(ttl)
    }
}

/// Holds the one snapshot a service serves.
///
/// Writes replace the slot wholesale; an expired snapshot stays readable
/// through [`RateSlot::latest`] until the next successful refresh.
#[derive(Debug, Default)]
pub struct RateSlot {
    entry: RwLock<Option<CacheEntry>>,
}

impl RateSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the snapshot if it is younger than `ttl`.
    pub fn fresh(&self, ttl: Duration) -> Option<Arc<RateSnapshot>> {
        let guard = self.entry.read();

        match guard.as_ref() {
            Some(entry) if entry.is_valid(ttl) => {
                debug!(source = %entry.snapshot.source, "Cache hit");
                Some(entry.snapshot.clone())
            }
            Some(_) => {
                debug!("Cache entry expired");
                None
            }
            None => {
                debug!("Cache miss");
                None
            }
        }
    }

    /// Get whatever snapshot is stored, fresh or not.
    pub fn latest(&self) -> Option<Arc<RateSnapshot>> {
        self.entry.read().as_ref().map(|entry| entry.snapshot.clone())
    }

    /// Store a new snapshot, replacing the previous one.
    pub fn replace(&self, snapshot: RateSnapshot) -> Arc<RateSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.entry.write() = Some(CacheEntry {
            snapshot: snapshot.clone(),
            invalidated: false,
        });
        snapshot
    }

    /// Force the next lookup to miss while keeping the snapshot readable.
    pub fn invalidate(&self) {
        if let Some(entry) = self.entry.write().as_mut() {
            entry.invalidated = true;
        }
    }

    /// Check if nothing has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.entry.read().is_none()
    }
}
