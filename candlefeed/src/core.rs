use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use candlefeed_core::{
    Candle, CandleCache, Clock, FeedConfig, FeedError, FeedPhase, GapFillConfig, Granularity,
    GranularityBand, HistoricalSource, PreloadConfig, QuotaConfig, RetentionConfig, SystemClock,
    TickSource, TickStatus, TimeRange, WriteCoordinator,
};
use candlefeed_middleware::SourceBuilder;

use crate::aggregator::RealtimeAggregator;
use crate::debounce::DebounceTimer;
use crate::feed::subscribers::{FeedSubscriber, SubscriberRegistry};
use crate::feed::visible::RangeData;
use crate::feed::{FeedInner, FeedState};
use crate::gap_filler::GapFiller;
use crate::selector::GranularitySelector;

/// Gap-free candle series for one symbol.
///
/// Dropping the feed tears it down like [`disconnect`](Self::disconnect),
/// except that the tick stream is aborted instead of stopped gracefully.
pub struct CandleFeed {
    inner: Arc<FeedInner>,
}

/// Builder for constructing a [`CandleFeed`].
#[derive(Clone)]
pub struct CandleFeedBuilder {
    symbol: String,
    cache: Option<Arc<dyn CandleCache>>,
    source: Option<Arc<dyn HistoricalSource>>,
    tick_source: Option<Arc<dyn TickSource>>,
    clock: Option<Arc<dyn Clock>>,
    cfg: FeedConfig,
    initial: Option<Granularity>,
    quota: Option<QuotaConfig>,
    blacklist: Option<Duration>,
}

impl Default for CandleFeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleFeedBuilder {
    /// Create a builder with default configuration.
    ///
    /// A symbol, a cache and a historical source are required; the tick
    /// source is optional and only needed for [`CandleFeed::connect`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbol: String::new(),
            cache: None,
            source: None,
            tick_source: None,
            clock: None,
            cfg: FeedConfig::default(),
            initial: None,
            quota: None,
            blacklist: None,
        }
    }

    /// Instrument the feed serves.
    #[must_use]
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Candle store.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CandleCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Rate-limited bulk source used for backfill.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn HistoricalSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Real-time price stream.
    #[must_use]
    pub fn with_tick_source(mut self, ticks: Arc<dyn TickSource>) -> Self {
        self.tick_source = Some(ticks);
        self
    }

    /// Clock used to clip ranges and stamp ticks. Defaults to the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: FeedConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Backfill tuning.
    #[must_use]
    pub fn gap_fill(mut self, cfg: GapFillConfig) -> Self {
        self.cfg.gap_fill = cfg;
        self
    }

    /// Granularity bands, finest first.
    #[must_use]
    pub fn bands(mut self, bands: Vec<GranularityBand>) -> Self {
        self.cfg.selector.bands = bands;
        self
    }

    /// Quiet period before an automatic granularity change.
    #[must_use]
    pub const fn debounce(mut self, delay: Duration) -> Self {
        self.cfg.selector.debounce = delay;
        self
    }

    /// In-memory buffer bounds.
    #[must_use]
    pub const fn retention(mut self, cfg: RetentionConfig) -> Self {
        self.cfg.retention = cfg;
        self
    }

    /// Neighbour preloading after transitions.
    #[must_use]
    pub const fn preload(mut self, cfg: PreloadConfig) -> Self {
        self.cfg.preload = cfg;
        self
    }

    /// Window served when a requested range collapses after clipping to now.
    #[must_use]
    pub const fn default_window(mut self, window: Duration) -> Self {
        self.cfg.default_window = window;
        self
    }

    /// Start on `granularity` instead of the one recommended for the default window.
    #[must_use]
    pub const fn initial_granularity(mut self, granularity: Granularity) -> Self {
        self.initial = Some(granularity);
        self
    }

    /// Wrap the historical source with a call budget.
    #[must_use]
    pub fn quota(mut self, cfg: QuotaConfig) -> Self {
        self.quota = Some(cfg);
        self
    }

    /// Wrap the historical source with a blacklist that trips on quota and
    /// rate-limit errors; `default_duration` applies when the error has no hint.
    #[must_use]
    pub const fn blacklist(mut self, default_duration: Duration) -> Self {
        self.blacklist = Some(default_duration);
        self
    }

    /// Build the feed.
    ///
    /// # Errors
    /// Returns `InvalidArg` if a required collaborator or the symbol is
    /// missing, or if the configuration is out of range.
    pub fn build(self) -> Result<CandleFeed, FeedError> {
        if self.symbol.trim().is_empty() {
            return Err(FeedError::InvalidArg("symbol is required".to_string()));
        }
        let cache = self.cache.ok_or_else(|| {
            FeedError::InvalidArg(
                "a candle cache is required; add one via with_cache(...)".to_string(),
            )
        })?;
        let raw = self.source.ok_or_else(|| {
            FeedError::InvalidArg(
                "a historical source is required; add one via with_source(...)".to_string(),
            )
        })?;
        validate_config(&self.cfg)?;
        let selector = GranularitySelector::new(self.cfg.selector.bands.clone())?;

        let initial = match self.initial {
            Some(g) if selector.band(g).is_none() => {
                return Err(FeedError::InvalidArg(format!(
                    "initial granularity {g} has no configured band"
                )));
            }
            Some(g) => g,
            None => {
                let finest = selector
                    .bands()
                    .first()
                    .map_or(Granularity::M1, |b| b.granularity);
                let hours = self.cfg.default_window.as_secs_f64() / 3_600.0;
                selector.recommend(hours, finest)
            }
        };

        let mut stack = SourceBuilder::new(raw);
        if let Some(quota) = &self.quota {
            stack = stack.with_quota(quota);
        }
        if let Some(duration) = self.blacklist {
            stack = stack.with_blacklist(duration);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(symbol = %self.symbol, stack = %stack.describe(), "historical source stack");
        let source = stack.build();

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let writes = Arc::new(WriteCoordinator::new());
        let gap_filler = GapFiller::new(
            Arc::clone(&cache),
            source,
            Arc::clone(&clock),
            Arc::clone(&writes),
            self.cfg.gap_fill.clone(),
        );

        let inner = FeedInner {
            symbol: self.symbol,
            debounce: DebounceTimer::new(self.cfg.selector.debounce),
            cfg: self.cfg,
            cache,
            tick_source: self.tick_source,
            clock,
            writes,
            gap_filler,
            selector,
            state: Mutex::new(FeedState::new(initial)),
            aggregator: Mutex::new(RealtimeAggregator::new(initial)),
            subscribers: SubscriberRegistry::default(),
            transition_lock: tokio::sync::Mutex::new(()),
            destroyed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            stream: Mutex::new(None),
        };
        Ok(CandleFeed {
            inner: Arc::new(inner),
        })
    }
}

fn validate_config(cfg: &FeedConfig) -> Result<(), FeedError> {
    let gf = &cfg.gap_fill;
    if !(gf.coverage_tolerance > 0.0 && gf.coverage_tolerance <= 1.0) {
        return Err(FeedError::InvalidArg(format!(
            "coverage_tolerance must be in (0, 1], got {}",
            gf.coverage_tolerance
        )));
    }
    if !(0.0..=1.0).contains(&gf.skip_threshold) {
        return Err(FeedError::InvalidArg(format!(
            "skip_threshold must be in [0, 1], got {}",
            gf.skip_threshold
        )));
    }
    if gf.batch_width == 0 {
        return Err(FeedError::InvalidArg("batch_width must be at least 1".to_string()));
    }
    if gf.max_consecutive_empty == 0 {
        return Err(FeedError::InvalidArg(
            "max_consecutive_empty must be at least 1".to_string(),
        ));
    }
    if cfg.default_window < Duration::from_secs(1) {
        return Err(FeedError::InvalidArg(
            "default_window must be at least one second".to_string(),
        ));
    }
    if cfg.preload.jitter_percent > 100 {
        return Err(FeedError::InvalidArg(format!(
            "preload jitter_percent must be in [0, 100], got {}",
            cfg.preload.jitter_percent
        )));
    }
    if cfg.retention.max_buffer_candles == 0 {
        return Err(FeedError::InvalidArg(
            "max_buffer_candles must be at least 1".to_string(),
        ));
    }
    Ok(())
}

impl CandleFeed {
    /// Start building a new `CandleFeed`.
    #[must_use]
    pub fn builder() -> CandleFeedBuilder {
        CandleFeedBuilder::new()
    }

    /// Candles for the visible window `[start, end)` at the active granularity.
    ///
    /// The range is clipped to now; a range that collapses is replaced by the
    /// default window. Missing candles are backfilled before the cache is
    /// read, and the open real-time candle is merged in. Outside manual mode
    /// the call also feeds the granularity selector: a different
    /// recommendation is applied once calls have been quiet for the debounce
    /// period, and [`FeedEvent::GranularityChanged`](crate::FeedEvent) is
    /// emitted when it lands.
    ///
    /// # Errors
    /// Returns `FeedError::Destroyed` after teardown. Backfill problems never
    /// fail the call; the result simply holds what could be loaded.
    pub async fn get_data_for_visible_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<RangeData, FeedError> {
        self.inner.visible_range_data(start, end).await
    }

    /// Pin the active granularity and disable automatic selection.
    ///
    /// Waits for a running transition to finish, then switches if needed.
    ///
    /// # Errors
    /// Returns `FeedError::Destroyed` if the feed is torn down before or
    /// during the switch.
    pub async fn set_manual_granularity(&self, granularity: Granularity) -> Result<(), FeedError> {
        self.inner.set_manual(granularity).await
    }

    /// Return to automatic selection, re-evaluating the last visible range.
    pub fn enable_auto_granularity(&self) {
        self.inner.enable_auto();
    }

    /// Store a candle for the active series and add it to the buffer.
    ///
    /// # Errors
    /// Returns `InvalidCandle` if the candle is misaligned or inconsistent,
    /// the cache's error if the write fails, and `Destroyed` after teardown.
    pub async fn append_candle(&self, candle: Candle) -> Result<(), FeedError> {
        self.inner.append_candle(candle).await
    }

    /// Subscribe to the tick source and start aggregating.
    ///
    /// Calling it again while connected is a no-op.
    ///
    /// # Errors
    /// Returns `InvalidArg` without a tick source, the source's error if the
    /// subscription fails, and `Destroyed` after teardown.
    pub async fn connect(&self) -> Result<(), FeedError> {
        self.inner.connect().await
    }

    /// Tear the feed down.
    ///
    /// Cancels the debounce timer, in-flight backfill, preloads and the tick
    /// pump, drops all subscribers and stops the tick stream. Every later
    /// operation fails with `FeedError::Destroyed`. Idempotent.
    pub async fn disconnect(&self) {
        if let Some(stream) = self.inner.shutdown() {
            stream.stop().await;
        }
    }

    /// Register `subscriber` under `id`, replacing an existing one with the
    /// same id. Returns `true` if one was replaced.
    pub fn subscribe(&self, id: impl Into<String>, subscriber: Arc<dyn FeedSubscriber>) -> bool {
        self.inner.subscribers.insert(id.into(), subscriber)
    }

    /// Remove the subscriber registered under `id`.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.inner.subscribers.remove(id)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Instrument the feed serves.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.inner.symbol
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &FeedConfig {
        &self.inner.cfg
    }

    /// Granularity of the served series.
    #[must_use]
    pub fn active_granularity(&self) -> Granularity {
        self.inner.state().active
    }

    /// Recommendation waiting for the debounce period, if any.
    #[must_use]
    pub fn pending_granularity(&self) -> Option<Granularity> {
        self.inner.state().pending
    }

    /// Whether automatic selection is disabled.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.inner.state().manual
    }

    /// Load phase of the series at `granularity`.
    #[must_use]
    pub fn phase(&self, granularity: Granularity) -> FeedPhase {
        self.inner.state().phase(granularity)
    }

    /// Last visible range after clipping.
    #[must_use]
    pub fn visible_range(&self) -> Option<TimeRange> {
        self.inner.state().visible
    }

    /// Copy of the in-memory buffer for the active granularity.
    #[must_use]
    pub fn buffer_snapshot(&self) -> Vec<Candle> {
        self.inner.state().buffer.as_slice().to_vec()
    }

    /// Open real-time candle, if any.
    #[must_use]
    pub fn live_candle(&self) -> Option<Candle> {
        self.inner.aggregator().current()
    }

    /// Last status reported by the tick source.
    #[must_use]
    pub fn tick_status(&self) -> Option<TickStatus> {
        self.inner.state().status
    }

    /// Whether the feed has been torn down.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Gap filler serving this feed, for explicit backfill of other ranges.
    #[must_use]
    pub fn gap_filler(&self) -> &GapFiller {
        &self.inner.gap_filler
    }
}

impl Drop for CandleFeed {
    fn drop(&mut self) {
        if let Some(stream) = self.inner.shutdown() {
            stream.abort();
        }
    }
}
