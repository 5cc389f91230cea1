use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use candlefeed_types::Granularity;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identity of one candle series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    /// Instrument symbol.
    pub symbol: String,
    /// Bucket size.
    pub granularity: Granularity,
}

impl SeriesKey {
    /// Build a key.
    pub fn new(symbol: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            symbol: symbol.into(),
            granularity,
        }
    }
}

/// State guarded by a series lock.
#[derive(Debug, Default)]
pub struct SeriesState {
    /// Bucket currently owned by the real-time path, if any.
    pub live_bucket: Option<i64>,
}

impl SeriesState {
    /// Whether backfill may write the bucket starting at `time`.
    ///
    /// Only the bucket the tick path is still building is off limits.
    #[must_use]
    pub fn accepts_backfill(&self, time: i64) -> bool {
        self.live_bucket != Some(time)
    }

    /// Give up the live bucket once `now` is past its end.
    ///
    /// Returns the released bucket, if any.
    pub fn release_stale(&mut self, now: i64, bucket_secs: i64) -> Option<i64> {
        let live = self.live_bucket?;
        if now < live.saturating_add(bucket_secs) {
            return None;
        }
        self.live_bucket = None;
        Some(live)
    }
}

/// Exclusive access to one series' write path.
pub type SeriesWriteGuard = OwnedMutexGuard<SeriesState>;

/// Serializes writes per `(symbol, granularity)`.
///
/// The tick path and backfill both take the series lock before writing to the
/// cache, so a backfilled chunk can never interleave with, or overwrite, a
/// fresher real-time update of the same bucket.
#[derive(Default)]
pub struct WriteCoordinator {
    series: Mutex<HashMap<SeriesKey, Arc<AsyncMutex<SeriesState>>>>,
}

impl WriteCoordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for `key`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub async fn lock(&self, key: &SeriesKey) -> SeriesWriteGuard {
        let slot = {
            let mut map = self.series.lock().expect("mutex poisoned");
            Arc::clone(map.entry(key.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Forget every series; held guards stay valid.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.series.lock().expect("mutex poisoned").clear();
    }
}
