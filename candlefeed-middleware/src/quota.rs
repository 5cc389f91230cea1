//! Quota-aware historical source wrapper.
//!
//! Backfill is the bursty consumer of a historical source: a large visible
//! range can expand into dozens of chunk requests. This wrapper rejects calls
//! that would exceed the configured budget with `FeedError::QuotaExceeded`
//! instead of letting them reach the upstream API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use candlefeed_core::{
    Candle, FeedError, HistoricalSource, QuotaConfig, QuotaConsumptionStrategy, SourceMiddleware,
};
use tokio::time::Instant;

const EVEN_SPREAD_SLICES: u64 = 24;

/// Historical source that refuses calls once the configured quota is spent.
pub struct QuotaAwareSource {
    inner: Arc<dyn HistoricalSource>,
    ledger: Mutex<QuotaLedger>,
}

/// Call counter over a fixed period whose boundaries stay aligned to the
/// moment the counter was created.
struct Period {
    length: Duration,
    allowance: u64,
    used: u64,
    opened_at: Instant,
}

impl Period {
    const fn new(length: Duration, allowance: u64, now: Instant) -> Self {
        Self {
            length,
            allowance,
            used: 0,
            opened_at: now,
        }
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.opened_at);
        if elapsed < self.length {
            return;
        }
        let periods = elapsed.as_nanos() / self.length.as_nanos().max(1);
        let skipped = periods.saturating_mul(self.length.as_nanos());
        self.opened_at += Duration::from_nanos(u64::try_from(skipped).unwrap_or(u64::MAX));
        self.used = 0;
    }

    const fn exhausted(&self) -> bool {
        self.used >= self.allowance
    }

    fn remaining(&self) -> u64 {
        self.allowance.saturating_sub(self.used)
    }

    fn reset_in_ms(&self, now: Instant) -> u64 {
        millis(self.length.saturating_sub(now.duration_since(self.opened_at)))
    }
}

struct QuotaLedger {
    window: Period,
    // only present for `EvenSpread`
    slice: Option<Period>,
}

fn millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}

fn even_slice(config: &QuotaConfig, now: Instant) -> Period {
    let allowance = (config.limit / EVEN_SPREAD_SLICES).max(1);
    // Millisecond slices keep small test windows deterministic.
    let slice_ms = (millis(config.window) / EVEN_SPREAD_SLICES).max(1);
    Period::new(Duration::from_millis(slice_ms), allowance, now)
}

impl QuotaAwareSource {
    /// Create a new quota-aware wrapper around an existing source.
    pub fn new(inner: Arc<dyn HistoricalSource>, config: &QuotaConfig) -> Self {
        let now = Instant::now();
        let slice = match config.strategy {
            QuotaConsumptionStrategy::EvenSpread => Some(even_slice(config, now)),
            _ => None,
        };
        Self {
            inner,
            ledger: Mutex::new(QuotaLedger {
                window: Period::new(config.window, config.limit, now),
                slice,
            }),
        }
    }

    /// Access the inner source.
    pub fn inner(&self) -> &Arc<dyn HistoricalSource> {
        &self.inner
    }

    /// Consume one unit of quota, or explain why the call has to wait.
    ///
    /// # Errors
    /// Returns `FeedError::QuotaExceeded` when the window (or, for
    /// `EvenSpread`, the current slice) is spent. A slice rejection reports the
    /// units left in the window and the time until the next slice starts.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn should_allow_call(&self) -> Result<(), FeedError> {
        let now = Instant::now();
        let mut ledger = self.ledger.lock().expect("mutex poisoned");
        let QuotaLedger { window, slice } = &mut *ledger;

        window.roll(now);
        if window.exhausted() {
            return Err(FeedError::QuotaExceeded {
                remaining: 0,
                reset_in_ms: window.reset_in_ms(now),
            });
        }
        if let Some(slice) = slice {
            slice.roll(now);
            if slice.exhausted() {
                return Err(FeedError::QuotaExceeded {
                    remaining: window.remaining(),
                    reset_in_ms: slice.reset_in_ms(now),
                });
            }
            slice.used += 1;
        }
        window.used += 1;
        Ok(())
    }
}

#[async_trait]
impl HistoricalSource for QuotaAwareSource {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn max_candles_per_request(&self) -> usize {
        self.inner.max_candles_per_request()
    }

    async fn get_candles(
        &self,
        symbol: &str,
        granularity_secs: i64,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, FeedError> {
        self.should_allow_call().inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::debug!(source = self.inner.name(), symbol, error = %_err, "quota rejected call");
        })?;
        self.inner
            .get_candles(symbol, granularity_secs, start, end)
            .await
    }
}

/// Middleware config for constructing a [`QuotaAwareSource`].
pub struct QuotaMiddleware {
    /// Budget applied to the wrapped source.
    pub config: QuotaConfig,
}

impl QuotaMiddleware {
    /// Wrap sources with `config`.
    #[must_use]
    pub const fn new(config: QuotaConfig) -> Self {
        Self { config }
    }
}

impl SourceMiddleware for QuotaMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn HistoricalSource>) -> Arc<dyn HistoricalSource> {
        Arc::new(QuotaAwareSource::new(inner, &self.config))
    }

    fn name(&self) -> &'static str {
        "QuotaAwareSource"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "limit": self.config.limit,
            "window_ms": millis(self.config.window),
            "strategy": format!("{:?}", self.config.strategy),
        })
    }
}
