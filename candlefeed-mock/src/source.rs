use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use candlefeed_core::{Candle, Clock, FeedError, Granularity, HistoricalSource};

/// How the source answers requests for one symbol.
#[derive(Debug, Clone)]
pub enum HistoryBehavior {
    /// Synthesize a candle for every closed or open bucket at or after `horizon`.
    Synthetic {
        /// Oldest bucket the source knows about; `None` means unbounded.
        horizon: Option<i64>,
    },
    /// Serve these candles, filtered to each request.
    Return(Vec<Candle>),
    /// Fail every call.
    Fail(FeedError),
    /// Never resolve (simulate a stalled request).
    Hang,
}

impl Default for HistoryBehavior {
    fn default() -> Self {
        Self::Synthetic { horizon: None }
    }
}

/// One recorded `get_candles` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCall {
    /// Requested symbol.
    pub symbol: String,
    /// Requested bucket length.
    pub granularity_secs: i64,
    /// Requested start bound.
    pub start: Option<i64>,
    /// Requested end bound.
    pub end: Option<i64>,
}

#[derive(Default)]
struct SourceState {
    rules: HashMap<String, HistoryBehavior>,
    failing_calls: HashMap<usize, FeedError>,
    latency: Option<Duration>,
    calls: Vec<SourceCall>,
}

/// Deterministic candle for bucket `time`.
///
/// Prices depend only on `time`, so repeated fetches of the same bucket
/// return identical candles.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn synthetic_candle(time: i64) -> Candle {
    let base = 100.0 + (time / 60).rem_euclid(97) as f64 * 0.1;
    Candle::new(time, base, base + 0.2, base - 0.1, base + 0.05).with_volume(10.0)
}

/// Controller handle used by tests to drive a [`MockHistoricalSource`].
#[derive(Clone)]
pub struct MockSourceController {
    state: Arc<Mutex<SourceState>>,
}

impl MockSourceController {
    /// Set the behavior for `symbol`.
    pub async fn set_behavior(&self, symbol: &str, behavior: HistoryBehavior) {
        self.state
            .lock()
            .await
            .rules
            .insert(symbol.to_string(), behavior);
    }

    /// Fail the `n`-th call (1-based, counted across all symbols) with `err`.
    pub async fn fail_call(&self, n: usize, err: FeedError) {
        self.state.lock().await.failing_calls.insert(n, err);
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Copy of the call log.
    pub async fn calls(&self) -> Vec<SourceCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Forget the call log and scripted failures.
    pub async fn clear_calls(&self) {
        let mut guard = self.state.lock().await;
        guard.calls.clear();
        guard.failing_calls.clear();
    }
}

/// A `HistoricalSource` that synthesizes data and records every call.
///
/// Each response holds at most `max_candles_per_request` candles; when a
/// request spans more, the newest ones are returned. Buckets after the
/// clock's current bucket are never returned.
pub struct MockHistoricalSource {
    name: &'static str,
    max_per_request: usize,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SourceState>>,
}

impl MockHistoricalSource {
    /// Create a source and its controller.
    #[must_use]
    pub fn new_with_controller(
        name: &'static str,
        max_per_request: usize,
        clock: Arc<dyn Clock>,
    ) -> (Arc<dyn HistoricalSource>, MockSourceController) {
        let state = Arc::new(Mutex::new(SourceState::default()));
        let controller = MockSourceController {
            state: Arc::clone(&state),
        };
        let me = Arc::new(Self {
            name,
            max_per_request: max_per_request.max(1),
            clock,
            state,
        });
        (me as Arc<dyn HistoricalSource>, controller)
    }

    fn newest(&self, mut candles: Vec<Candle>) -> Vec<Candle> {
        if candles.len() > self.max_per_request {
            candles.drain(..candles.len() - self.max_per_request);
        }
        candles
    }
}

#[async_trait]
impl HistoricalSource for MockHistoricalSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn max_candles_per_request(&self) -> usize {
        self.max_per_request
    }

    async fn get_candles(
        &self,
        symbol: &str,
        granularity_secs: i64,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, FeedError> {
        let granularity = Granularity::from_seconds(granularity_secs).ok_or_else(|| {
            FeedError::InvalidArg(format!("unsupported granularity: {granularity_secs}s"))
        })?;

        // Log and snapshot the behavior without holding the lock across await points
        let (behavior, scripted, latency) = {
            let mut guard = self.state.lock().await;
            guard.calls.push(SourceCall {
                symbol: symbol.to_string(),
                granularity_secs,
                start,
                end,
            });
            let n = guard.calls.len();
            (
                guard.rules.get(symbol).cloned().unwrap_or_default(),
                guard.failing_calls.remove(&n),
                guard.latency,
            )
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = scripted {
            return Err(err);
        }

        let step = granularity.seconds();
        let open_bucket = granularity.align(self.clock.now());
        let end = end.unwrap_or(open_bucket + step).min(open_bucket + step);
        let span = i64::try_from(self.max_per_request).unwrap_or(i64::MAX);
        let start = start.unwrap_or_else(|| end.saturating_sub(span.saturating_mul(step)));

        match behavior {
            HistoryBehavior::Synthetic { horizon } => {
                let mut t = granularity.align_up(start.max(horizon.unwrap_or(i64::MIN)));
                let mut out = Vec::new();
                while t < end {
                    out.push(synthetic_candle(t));
                    t += step;
                }
                Ok(self.newest(out))
            }
            HistoryBehavior::Return(candles) => {
                let out = candles
                    .into_iter()
                    .filter(|c| c.time >= start && c.time < end && c.is_aligned(granularity))
                    .collect();
                Ok(self.newest(out))
            }
            HistoryBehavior::Fail(err) => Err(err),
            HistoryBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
