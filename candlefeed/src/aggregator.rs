use candlefeed_core::{Candle, Granularity, TickKind};

/// Result of folding one tick into the open candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateUpdate {
    /// Granularity the candle belongs to.
    pub granularity: Granularity,
    /// Open candle after the update.
    pub candle: Candle,
    /// `true` when the tick opened a new bucket.
    pub is_new_bucket: bool,
    /// Candle that closed because the tick opened a newer bucket.
    pub completed: Option<Candle>,
}

/// Folds ticks into the open candle of one granularity.
///
/// Ticks for the open bucket update it in place, a tick for a newer bucket
/// closes it, and late ticks for older buckets are ignored. Trade ticks
/// define the traded extremes: once one has been seen in a bucket, mid
/// ticks only move the close, clamped into `[low, high]`.
#[derive(Debug, Clone)]
pub struct RealtimeAggregator {
    granularity: Granularity,
    open: Option<Candle>,
    trade_seen: bool,
    last_completed: Option<Candle>,
}

impl RealtimeAggregator {
    /// Start tracking `granularity` with no open candle.
    #[must_use]
    pub const fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            open: None,
            trade_seen: false,
            last_completed: None,
        }
    }

    /// Tracked granularity.
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Current open candle, if any.
    #[must_use]
    pub const fn current(&self) -> Option<Candle> {
        self.open
    }

    /// Most recently completed candle, if any.
    #[must_use]
    pub const fn last_completed(&self) -> Option<Candle> {
        self.last_completed
    }

    /// Switch to `granularity`, optionally continuing from `seed`.
    ///
    /// A seed that is misaligned or inconsistent is ignored. A seed carrying
    /// volume came from traded data, so its extremes are treated as traded.
    pub fn retarget(&mut self, granularity: Granularity, seed: Option<Candle>) {
        self.granularity = granularity;
        self.last_completed = None;
        self.open = seed.filter(|c| c.is_aligned(granularity) && c.is_consistent());
        self.trade_seen = self
            .open
            .and_then(|c| c.volume)
            .is_some_and(|v| v > 0.0);
    }

    /// Continue from `seed`, a stored candle for a bucket newer than the open
    /// one, instead of opening that bucket flat.
    ///
    /// The open candle, if any, is completed. Returns `false` and leaves the
    /// state untouched when `seed` is not newer, misaligned or inconsistent.
    pub fn resume(&mut self, seed: Candle) -> bool {
        let newer = self.open.is_none_or(|c| c.time < seed.time);
        if !newer || !seed.is_aligned(self.granularity) || !seed.is_consistent() {
            return false;
        }
        if self.open.is_some() {
            self.last_completed = self.open;
        }
        self.open = Some(seed);
        self.trade_seen = seed.volume.is_some_and(|v| v > 0.0);
        true
    }

    /// Fold a tick at `time` into the series.
    ///
    /// Returns `None` for late ticks and non-finite prices.
    pub fn apply(
        &mut self,
        time: i64,
        price: f64,
        kind: TickKind,
        volume: Option<f64>,
    ) -> Option<AggregateUpdate> {
        if !price.is_finite() {
            return None;
        }
        let bucket = self.granularity.align(time);
        let traded = match kind {
            TickKind::Trade => volume.unwrap_or(0.0).max(0.0),
            TickKind::Mid => 0.0,
        };

        match self.open {
            Some(ref mut c) if c.time == bucket => {
                match kind {
                    TickKind::Trade => {
                        c.high = c.high.max(price);
                        c.low = c.low.min(price);
                        c.close = price;
                        c.volume = Some(c.volume.unwrap_or(0.0) + traded);
                        self.trade_seen = true;
                    }
                    TickKind::Mid if self.trade_seen => {
                        c.close = price.clamp(c.low, c.high);
                    }
                    TickKind::Mid => {
                        c.high = c.high.max(price);
                        c.low = c.low.min(price);
                        c.close = price;
                    }
                }
                Some(AggregateUpdate {
                    granularity: self.granularity,
                    candle: *c,
                    is_new_bucket: false,
                    completed: None,
                })
            }
            Some(c) if c.time > bucket => None,
            previous => {
                let candle = Candle::flat(bucket, price).with_volume(traded);
                self.trade_seen = matches!(kind, TickKind::Trade);
                self.open = Some(candle);
                if previous.is_some() {
                    self.last_completed = previous;
                }
                Some(AggregateUpdate {
                    granularity: self.granularity,
                    candle,
                    is_new_bucket: true,
                    completed: previous,
                })
            }
        }
    }
}
