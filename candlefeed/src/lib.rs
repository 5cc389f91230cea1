//! Candlefeed keeps a chart's candle series gap-free.
//!
//! Overview
//! - Serves OHLC candles for whatever window the chart shows, backfilling
//!   missing ranges from a rate-limited historical source into a cache.
//! - Picks the bucket size from the visible duration using overlapping bands,
//!   so zooming around a band edge does not flip granularities back and forth.
//! - Folds real-time ticks into the open candle and writes it through to the
//!   cache, never letting backfill overwrite the bucket the ticks own.
//!
//! Key behaviors and trade-offs
//! - Backfill is best effort: a failing chunk abandons its gap only, and the
//!   next request for an overlapping range retries what is still missing.
//!   Candles already stored are never fetched again.
//! - Chunks are fetched newest-first. A short or empty response marks the
//!   data horizon and stops the walk backwards, saving requests on sparse
//!   instruments at the cost of a tolerance knob (`coverage_tolerance`).
//! - Automatic granularity changes are debounced: only the last
//!   recommendation of a burst of range requests is applied.
//! - After a transition the neighbouring granularities are preloaded in the
//!   background with staggered, jittered delays.
//! - Trade ticks define the traded extremes; mid ticks that follow a trade
//!   only move the close, clamped into `[low, high]`.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use candlefeed::{CandleFeed, FeedEvent};
//!
//! let feed = CandleFeed::builder()
//!     .symbol("BTC-USD")
//!     .with_cache(cache)
//!     .with_source(rest_source)
//!     .with_tick_source(ws_source)
//!     .quota(candlefeed::QuotaConfig::default())
//!     .build()?;
//!
//! feed.subscribe("chart", Arc::new(|event: &FeedEvent| {
//!     println!("{event:?}");
//!     Ok(())
//! }));
//! feed.connect().await?;
//!
//! let data = feed.get_data_for_visible_range(start, end).await?;
//! // ... render data.candles at data.granularity ...
//! feed.disconnect().await;
//! ```
//!
//! See `candlefeed/demos/` for a runnable end-to-end demonstration.
#![warn(missing_docs)]

mod backoff;
pub(crate) mod core;
mod feed;

/// Real-time tick aggregation.
pub mod aggregator;
/// Bounded in-memory candle window.
pub mod buffer;
/// Restartable quiet-period timer.
pub mod debounce;
/// Gap detection and chunked backfill.
pub mod gap_filler;
/// Duration-to-granularity selection.
pub mod selector;

pub use aggregator::{AggregateUpdate, RealtimeAggregator};
pub use buffer::{CandleBuffer, retention_limit};
pub use core::{CandleFeed, CandleFeedBuilder};
pub use debounce::DebounceTimer;
pub use feed::subscribers::{FeedEvent, FeedSubscriber};
pub use feed::visible::RangeData;
pub use gap_filler::{FillReport, GapFiller};
pub use selector::GranularitySelector;

pub use candlefeed_middleware::{BlacklistMiddleware, QuotaMiddleware, SourceBuilder};

// Re-export core types for convenience
pub use candlefeed_core::{
    CacheMetadata, CachedRange, Candle, CandleCache, Clock, FeedConfig, FeedError, FeedPhase, Gap,
    GapFillConfig, Granularity, GranularityBand, HistoricalSource, PreloadConfig, QuotaConfig,
    QuotaConsumptionStrategy, RetentionConfig, SelectorConfig, SeriesKey, StreamHandle, SystemClock,
    Tick, TickEvent, TickKind, TickSource, TickStatus, TimeRange, WriteCoordinator,
};
