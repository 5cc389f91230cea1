use candlefeed_core::{Candle, Granularity, TimeRange, sanitize_candles, upsert_candle};

/// Ordered in-memory candle window for the active granularity.
///
/// Candles are ascending with unique `time`. The buffer is bounded
/// independently from the cache: trimming drops the oldest candles only.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    granularity: Granularity,
    candles: Vec<Candle>,
}

impl CandleBuffer {
    /// Empty buffer for `granularity`.
    #[must_use]
    pub const fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            candles: Vec::new(),
        }
    }

    /// Granularity of the buffered candles.
    #[must_use]
    pub const fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Replace the contents, switching granularity if needed.
    pub fn reset(&mut self, granularity: Granularity, candles: Vec<Candle>) {
        self.granularity = granularity;
        self.candles = sanitize_candles(candles, granularity, None);
    }

    /// Insert or replace by `time`. Returns `true` for a new bucket.
    ///
    /// Candles of another granularity are rejected with `false`.
    pub fn upsert(&mut self, candle: Candle) -> bool {
        if !candle.is_aligned(self.granularity) {
            return false;
        }
        upsert_candle(&mut self.candles, candle)
    }

    /// Drop the oldest candles so at most `limit` remain.
    pub fn trim(&mut self, limit: usize) {
        if self.candles.len() > limit {
            let excess = self.candles.len() - limit;
            self.candles.drain(..excess);
        }
    }

    /// Candles whose bucket lies in `range`.
    #[must_use]
    pub fn range(&self, range: TimeRange) -> Vec<Candle> {
        let lo = self.candles.partition_point(|c| c.time < range.start);
        let hi = self.candles.partition_point(|c| c.time < range.end);
        self.candles[lo..hi].to_vec()
    }

    /// Newest candle.
    #[must_use]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// All buffered candles.
    #[must_use]
    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// Number of buffered candles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

/// Buffer bound for a visible range: `min(max_buffer, visible buckets + margin)`.
#[must_use]
pub fn retention_limit(
    visible: Option<TimeRange>,
    granularity: Granularity,
    max_buffer_candles: usize,
    margin_candles: usize,
) -> usize {
    visible.map_or(max_buffer_candles, |r| {
        let visible_buckets = usize::try_from(r.bucket_count(granularity)).unwrap_or(usize::MAX);
        max_buffer_candles.min(visible_buckets.saturating_add(margin_candles))
    })
}
