use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use candlefeed_core::{
    CacheMetadata, CachedRange, Candle, CandleCache, FeedError, Granularity, SeriesKey,
    TimeRange, find_gaps,
};

#[derive(Default)]
struct CacheState {
    series: HashMap<SeriesKey, BTreeMap<i64, Candle>>,
    read_failure: Option<FeedError>,
    write_failure: Option<FeedError>,
    corrupt_reads: bool,
    reads: usize,
    chunk_writes: usize,
    latest_writes: usize,
}

/// In-memory `CandleCache` keyed by `(symbol, granularity, time)`.
///
/// Reads report gaps with [`find_gaps`], so the cache behaves like a real
/// store from the gap filler's point of view. Tests can make reads or writes
/// fail, or make reads return an unsorted series with duplicates.
#[derive(Default)]
pub struct MemoryCandleCache {
    state: Mutex<CacheState>,
}

impl MemoryCandleCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert candles directly, bypassing counters.
    pub async fn seed(&self, symbol: &str, granularity: Granularity, candles: Vec<Candle>) {
        let mut guard = self.state.lock().await;
        let series = guard
            .series
            .entry(SeriesKey::new(symbol, granularity))
            .or_default();
        for c in candles {
            series.insert(c.time, c);
        }
    }

    /// Every stored candle of one series, ascending.
    pub async fn snapshot(&self, symbol: &str, granularity: Granularity) -> Vec<Candle> {
        let guard = self.state.lock().await;
        guard
            .series
            .get(&SeriesKey::new(symbol, granularity))
            .map(|s| s.values().copied().collect())
            .unwrap_or_default()
    }

    /// Make every read fail with `err` (or succeed again with `None`).
    pub async fn set_read_failure(&self, err: Option<FeedError>) {
        self.state.lock().await.read_failure = err;
    }

    /// Make every write fail with `err` (or succeed again with `None`).
    pub async fn set_write_failure(&self, err: Option<FeedError>) {
        self.state.lock().await.write_failure = err;
    }

    /// Return reversed, duplicated candles from reads.
    pub async fn set_corrupt_reads(&self, corrupt: bool) {
        self.state.lock().await.corrupt_reads = corrupt;
    }

    /// Number of `get_cached_candles` calls so far.
    pub async fn read_count(&self) -> usize {
        self.state.lock().await.reads
    }

    /// Number of successful `store_chunk` calls so far.
    pub async fn chunk_write_count(&self) -> usize {
        self.state.lock().await.chunk_writes
    }

    /// Number of successful `update_latest_candle` calls so far.
    pub async fn latest_write_count(&self) -> usize {
        self.state.lock().await.latest_writes
    }
}

#[async_trait]
impl CandleCache for MemoryCandleCache {
    async fn get_cached_candles(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> Result<CachedRange, FeedError> {
        let mut guard = self.state.lock().await;
        guard.reads += 1;
        if let Some(err) = &guard.read_failure {
            return Err(err.clone());
        }
        let Ok(range) = TimeRange::new(start, end) else {
            return Ok(CachedRange::default());
        };
        let mut candles: Vec<Candle> = guard
            .series
            .get(&SeriesKey::new(symbol, granularity))
            .map(|s| s.range(start..end).map(|(_, c)| *c).collect())
            .unwrap_or_default();
        let gaps = find_gaps(&candles, range, granularity);
        if guard.corrupt_reads && !candles.is_empty() {
            let dup = candles[0];
            candles.reverse();
            candles.push(dup);
        }
        Ok(CachedRange { candles, gaps })
    }

    async fn store_chunk(
        &self,
        symbol: &str,
        granularity: Granularity,
        candles: Vec<Candle>,
    ) -> Result<(), FeedError> {
        let mut guard = self.state.lock().await;
        if let Some(err) = &guard.write_failure {
            return Err(err.clone());
        }
        guard.chunk_writes += 1;
        let series = guard
            .series
            .entry(SeriesKey::new(symbol, granularity))
            .or_default();
        for c in candles {
            series.insert(c.time, c);
        }
        Ok(())
    }

    async fn update_latest_candle(
        &self,
        symbol: &str,
        granularity: Granularity,
        candle: Candle,
    ) -> Result<(), FeedError> {
        let mut guard = self.state.lock().await;
        if let Some(err) = &guard.write_failure {
            return Err(err.clone());
        }
        guard.latest_writes += 1;
        guard
            .series
            .entry(SeriesKey::new(symbol, granularity))
            .or_default()
            .insert(candle.time, candle);
        Ok(())
    }

    async fn get_metadata(&self, symbol: &str) -> Result<CacheMetadata, FeedError> {
        let guard = self.state.lock().await;
        if let Some(err) = &guard.read_failure {
            return Err(err.clone());
        }
        let total: usize = guard
            .series
            .iter()
            .filter(|(k, _)| k.symbol == symbol)
            .map(|(_, s)| s.len())
            .sum();
        Ok(CacheMetadata {
            total_candles: u64::try_from(total).unwrap_or(u64::MAX),
        })
    }
}
