use serde::{Deserialize, Serialize};

use crate::{Candle, FeedError, Granularity};

/// Half-open time window `[start, end)` in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: i64,
    /// Exclusive end.
    pub end: i64,
}

/// A sub-range of a requested window that the cache does not hold.
pub type Gap = TimeRange;

impl TimeRange {
    /// Build a range, rejecting `start >= end`.
    ///
    /// # Errors
    /// Returns `FeedError::InvalidArg` when the range is empty or inverted.
    pub fn new(start: i64, end: i64) -> Result<Self, FeedError> {
        if start >= end {
            return Err(FeedError::InvalidArg(format!(
                "empty time range: start={start} end={end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Duration in seconds.
    #[must_use]
    pub const fn duration_secs(&self) -> i64 {
        self.end - self.start
    }

    /// Duration in hours.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        self.duration_secs() as f64 / 3_600.0
    }

    /// Number of aligned buckets whose start lies inside the range.
    #[must_use]
    pub const fn bucket_count(&self, granularity: Granularity) -> i64 {
        let first = granularity.align_up(self.start);
        if first >= self.end {
            return 0;
        }
        (self.end - first + granularity.seconds() - 1) / granularity.seconds()
    }

    /// Whether the bucket starting at `ts` belongs to the range.
    #[must_use]
    pub const fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Whether two ranges overlap or touch.
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Result of a cache range read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedRange {
    /// Cached candles, ascending by unique `time`.
    pub candles: Vec<Candle>,
    /// Sub-ranges with no cached candles.
    pub gaps: Vec<Gap>,
}

/// Cache-wide statistics for one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Candles stored across every granularity.
    pub total_candles: u64,
}
