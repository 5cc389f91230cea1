//! Internals of [`CandleFeed`](crate::CandleFeed).
//!
//! Each submodule adds one slice of behavior to [`FeedInner`]:
//! - `visible`: range requests from the chart.
//! - `transition`: debounced and manual granularity changes.
//! - `preload`: background warm-up of neighbouring granularities.
//! - `realtime`: tick pump, aggregation and write-through.
//! - `subscribers`: event fan-out with per-subscriber isolation.
//!
//! Spawned tasks and timer callbacks hold a `Weak<FeedInner>` so a dropped
//! feed is never kept alive by its own background work.

pub(crate) mod preload;
pub(crate) mod realtime;
pub(crate) mod subscribers;
pub(crate) mod transition;
pub(crate) mod visible;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use candlefeed_core::{
    Candle, CandleCache, Clock, FeedConfig, FeedError, FeedPhase, Granularity, StreamHandle,
    TickSource, TickStatus, TimeRange, WriteCoordinator, sanitize_candles,
};
use tokio::task::JoinHandle;

use crate::aggregator::RealtimeAggregator;
use crate::buffer::{CandleBuffer, retention_limit};
use crate::debounce::DebounceTimer;
use crate::gap_filler::GapFiller;
use crate::selector::GranularitySelector;
use subscribers::SubscriberRegistry;

/// Mutable view state guarded by one mutex.
pub(crate) struct FeedState {
    pub(crate) active: Granularity,
    pub(crate) pending: Option<Granularity>,
    pub(crate) manual: bool,
    pub(crate) visible: Option<TimeRange>,
    pub(crate) buffer: CandleBuffer,
    pub(crate) phases: HashMap<Granularity, FeedPhase>,
    pub(crate) status: Option<TickStatus>,
}

impl FeedState {
    pub(crate) fn new(active: Granularity) -> Self {
        Self {
            active,
            pending: None,
            manual: false,
            visible: None,
            buffer: CandleBuffer::new(active),
            phases: HashMap::new(),
            status: None,
        }
    }

    pub(crate) fn phase(&self, granularity: Granularity) -> FeedPhase {
        self.phases.get(&granularity).copied().unwrap_or_default()
    }
}

pub(crate) struct FeedInner {
    pub(crate) symbol: String,
    pub(crate) cfg: FeedConfig,
    pub(crate) cache: Arc<dyn CandleCache>,
    pub(crate) tick_source: Option<Arc<dyn TickSource>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) writes: Arc<WriteCoordinator>,
    pub(crate) gap_filler: GapFiller,
    pub(crate) selector: GranularitySelector,
    pub(crate) debounce: DebounceTimer,
    pub(crate) state: Mutex<FeedState>,
    pub(crate) aggregator: Mutex<RealtimeAggregator>,
    pub(crate) subscribers: SubscriberRegistry,
    /// Held for the whole of a granularity transition.
    pub(crate) transition_lock: tokio::sync::Mutex<()>,
    pub(crate) destroyed: AtomicBool,
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) stream: Mutex<Option<StreamHandle>>,
}

impl FeedInner {
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub(crate) fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().expect("mutex poisoned")
    }

    /// # Panics
    /// Panics if the aggregator mutex is poisoned.
    pub(crate) fn aggregator(&self) -> MutexGuard<'_, RealtimeAggregator> {
        self.aggregator.lock().expect("mutex poisoned")
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Spawn a background task that teardown aborts.
    pub(crate) fn spawn_tracked<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_destroyed() {
            return;
        }
        let handle = tokio::spawn(fut);
        let mut tasks = self.tasks.lock().expect("mutex poisoned");
        tasks.retain(|t| !t.is_finished());
        if self.is_destroyed() {
            // teardown drained the list between the check and the push
            handle.abort();
        } else {
            tasks.push(handle);
        }
    }

    pub(crate) fn retention_limit(&self, state: &FeedState) -> usize {
        retention_limit(
            state.visible,
            state.buffer.granularity(),
            self.cfg.retention.max_buffer_candles,
            self.cfg.retention.margin_candles,
        )
    }

    /// The visible range, or the default window ending now.
    pub(crate) fn visible_or_default(&self) -> TimeRange {
        let visible = self.state().visible;
        visible.unwrap_or_else(|| {
            let now = self.clock.now();
            visible::normalize_range(now, now, now, self.cfg.default_window)
        })
    }

    /// Sanitized cache read; falls back to the buffer when the cache is unusable.
    pub(crate) async fn read_range(&self, range: TimeRange, granularity: Granularity) -> Vec<Candle> {
        match self
            .cache
            .get_cached_candles(&self.symbol, granularity, range.start, range.end)
            .await
        {
            Ok(cached) => sanitize_candles(cached.candles, granularity, Some(range)),
            Err(err) => {
                warn_failure(&self.symbol, "cache read failed; serving buffered candles", &err);
                let state = self.state();
                if state.buffer.granularity() == granularity {
                    state.buffer.range(range)
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Stop every background activity. Returns the tick stream handle on the
    /// first call so the caller can stop it gracefully or abort it.
    pub(crate) fn shutdown(&self) -> Option<StreamHandle> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return None;
        }
        #[cfg(feature = "tracing")]
        tracing::info!(symbol = %self.symbol, "tearing down candle feed");

        self.debounce.cancel();
        self.gap_filler.cancel_all();
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .expect("mutex poisoned")
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        self.subscribers.clear();
        self.stream.lock().expect("mutex poisoned").take()
    }
}

/// Log a failure that does not propagate to the caller.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub(crate) fn warn_failure(symbol: &str, context: &'static str, err: &FeedError) {
    #[cfg(feature = "tracing")]
    tracing::warn!(symbol, error = %err, "{context}");
}
