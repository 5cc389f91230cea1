use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Granularity;

/// One OHLC bucket. `time` is the bucket start in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, epoch seconds.
    pub time: i64,
    /// First price in the bucket.
    pub open: f64,
    /// Highest price in the bucket.
    pub high: f64,
    /// Lowest price in the bucket.
    pub low: f64,
    /// Last price in the bucket.
    pub close: f64,
    /// Traded volume, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Average bid/ask spread, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

impl Candle {
    /// Build a candle with explicit OHLC values and no volume or spread.
    #[must_use]
    pub const fn new(time: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
            spread: None,
        }
    }

    /// Build a flat candle where open, high, low and close all equal `price`.
    #[must_use]
    pub const fn flat(time: i64, price: f64) -> Self {
        Self::new(time, price, price, price, price)
    }

    /// Attach a volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Check `low <= {open, close} <= high` and that every price is finite.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }

    /// True if `time` sits on a bucket boundary of `granularity`.
    #[must_use]
    pub const fn is_aligned(&self, granularity: Granularity) -> bool {
        self.time.rem_euclid(granularity.seconds()) == 0
    }

    /// Bucket start as a UTC timestamp.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}
