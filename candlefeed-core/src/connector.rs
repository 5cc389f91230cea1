use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::stream::StreamHandle;
use candlefeed_types::{CacheMetadata, CachedRange, Candle, FeedError, Granularity, TickEvent};

/// Key-value candle store keyed by `(symbol, granularity, time)`.
///
/// The storage engine is out of scope; implementations only need to honor
/// upsert-by-time semantics and report the gaps of a range read.
#[async_trait]
pub trait CandleCache: Send + Sync {
    /// Read cached candles in `[start, end)` together with the missing sub-ranges.
    ///
    /// Candles must be ascending with unique `time`. Callers treat an error or
    /// a malformed response as a full gap over the requested range.
    async fn get_cached_candles(
        &self,
        symbol: &str,
        granularity: Granularity,
        start: i64,
        end: i64,
    ) -> Result<CachedRange, FeedError>;

    /// Upsert a batch of candles.
    async fn store_chunk(
        &self,
        symbol: &str,
        granularity: Granularity,
        candles: Vec<Candle>,
    ) -> Result<(), FeedError>;

    /// Upsert a single candle by `time`.
    async fn update_latest_candle(
        &self,
        symbol: &str,
        granularity: Granularity,
        candle: Candle,
    ) -> Result<(), FeedError>;

    /// Cache-wide statistics for `symbol`.
    async fn get_metadata(&self, symbol: &str) -> Result<CacheMetadata, FeedError>;
}

/// Rate-limited bulk candle source (REST-style).
#[async_trait]
pub trait HistoricalSource: Send + Sync {
    /// Human-readable source name for logging and error tagging.
    fn name(&self) -> &'static str;

    /// Maximum number of candles a single `get_candles` call returns.
    ///
    /// Callers split larger ranges into chunks of this size.
    fn max_candles_per_request(&self) -> usize;

    /// Fetch candles of `granularity_secs` with bucket start in `[start, end)`.
    ///
    /// `None` bounds let the source choose (typically the most recent page).
    async fn get_candles(
        &self,
        symbol: &str,
        granularity_secs: i64,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, FeedError>;
}

/// Push-based real-time price feed.
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Human-readable source name for logging and error tagging.
    fn name(&self) -> &'static str;

    /// Start streaming price and status events for `symbol`.
    ///
    /// Returns a handle that stops the stream plus the receiving side of the
    /// event channel. Event cadence is not controlled by the caller.
    async fn subscribe(
        &self,
        symbol: &str,
    ) -> Result<(StreamHandle, mpsc::Receiver<TickEvent>), FeedError>;
}
