// Shared fixtures for the feed tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use candlefeed::{
    CandleCache, CandleFeed, CandleFeedBuilder, Clock, FeedError, FeedEvent, FeedSubscriber, GapFillConfig,
    HistoricalSource, PreloadConfig, TickSource,
};
use candlefeed_mock::{
    ManualClock, ManualTickSource, MemoryCandleCache, MockHistoricalSource, MockSourceController,
    TickController,
};

pub const SYMBOL: &str = "BTC-USD";

/// Midnight UTC, so every granularity has a bucket boundary at `NOW`.
pub const NOW: i64 = 1_700_006_400;

pub const HOUR: i64 = 3_600;
pub const DAY: i64 = 86_400;

/// Collaborators wired to one clock, plus their controllers.
pub struct Harness {
    pub cache: Arc<MemoryCandleCache>,
    pub source: Arc<dyn HistoricalSource>,
    pub source_ctl: MockSourceController,
    pub ticks: Arc<dyn TickSource>,
    pub tick_ctl: TickController,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(max_per_request: usize) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let (source, source_ctl) = MockHistoricalSource::new_with_controller(
            "mock-rest",
            max_per_request,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        let (ticks, tick_ctl) = ManualTickSource::new_with_controller("mock-ws");
        Self {
            cache: Arc::new(MemoryCandleCache::new()),
            source,
            source_ctl,
            ticks,
            tick_ctl,
            clock,
        }
    }

    /// Builder with every collaborator set, no pacing delays and no preload.
    pub fn builder(&self) -> CandleFeedBuilder {
        CandleFeed::builder()
            .symbol(SYMBOL)
            .with_cache(Arc::clone(&self.cache) as Arc<dyn CandleCache>)
            .with_source(Arc::clone(&self.source))
            .with_tick_source(Arc::clone(&self.ticks))
            .with_clock(Arc::clone(&self.clock) as Arc<dyn Clock>)
            .gap_fill(fast_gap_fill())
            .preload(PreloadConfig {
                enabled: false,
                ..PreloadConfig::default()
            })
    }

    pub fn feed(&self) -> CandleFeed {
        self.builder().build().expect("feed builds")
    }
}

pub fn fast_gap_fill() -> GapFillConfig {
    GapFillConfig {
        chunk_delay: Duration::ZERO,
        batch_delay: Duration::ZERO,
        ..GapFillConfig::default()
    }
}

/// Subscriber that records every event it sees.
#[derive(Default, Clone)]
pub struct Recorder {
    events: Arc<Mutex<Vec<FeedEvent>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn granularity_changes(&self) -> Vec<FeedEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, FeedEvent::GranularityChanged { .. }))
            .collect()
    }
}

impl FeedSubscriber for Recorder {
    fn on_event(&self, event: &FeedEvent) -> Result<(), FeedError> {
        self.events.lock().unwrap().push(*event);
        Ok(())
    }
}

/// Poll `cond` on virtual time until it holds or `limit` elapses.
pub async fn wait_until<F: Fn() -> bool>(cond: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Let spawned tasks run to quiescence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
