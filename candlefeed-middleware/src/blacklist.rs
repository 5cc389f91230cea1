use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use candlefeed_core::{Candle, FeedError, HistoricalSource, SourceMiddleware};
use tokio::time::Instant;

/// Source wrapper that stops calling its inner source for a period after a
/// quota or rate-limit rejection.
///
/// While blacklisted every call fails fast with
/// `FeedError::TemporarilyBlacklisted`, which the gap filler treats like any
/// other chunk failure: the gap is abandoned and retried on a later request.
pub struct BlacklistingSource {
    inner: Arc<dyn HistoricalSource>,
    state: Mutex<Option<Instant>>, // blacklist-until; None means active
    default_duration: Duration,
}

impl BlacklistingSource {
    /// Wrap `inner`; `default_duration` applies when the error carries no reset hint.
    pub fn new(inner: Arc<dyn HistoricalSource>, default_duration: Duration) -> Self {
        Self {
            inner,
            state: Mutex::new(None),
            default_duration,
        }
    }

    /// Time left on the blacklist, if any.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn blacklisted_for(&self) -> Option<Duration> {
        let mut guard = self.state.lock().expect("mutex poisoned");
        let now = Instant::now();
        if let Some(until) = *guard {
            if now < until {
                return Some(until - now);
            }
            // expired
            *guard = None;
        }
        None
    }

    fn blacklist_until(&self, until: Instant) {
        let mut guard = self.state.lock().expect("mutex poisoned");
        *guard = Some(until);
    }

    fn handle_error(&self, err: FeedError) -> FeedError {
        let duration = match &err {
            // Only window exhaustion (remaining == 0) earns the long blacklist.
            FeedError::QuotaExceeded {
                remaining: 0,
                reset_in_ms,
            } if *reset_in_ms > 0 => Duration::from_millis(*reset_in_ms),
            FeedError::QuotaExceeded { remaining: 0, .. } => self.default_duration,
            // Slice exhaustion: back off until the slice resets.
            FeedError::QuotaExceeded { reset_in_ms, .. } => {
                Duration::from_millis((*reset_in_ms).max(1))
            }
            FeedError::RateLimitExceeded { window_ms, .. } if *window_ms > 0 => {
                Duration::from_millis(*window_ms)
            }
            FeedError::RateLimitExceeded { .. } => self.default_duration,
            _ => return err,
        };
        #[cfg(feature = "tracing")]
        tracing::warn!(
            source = self.inner.name(),
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "blacklisting historical source"
        );
        self.blacklist_until(Instant::now() + duration);
        err
    }
}

#[async_trait]
impl HistoricalSource for BlacklistingSource {
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
        if let Some(left) = self.blacklisted_for() {
            return Err(FeedError::TemporarilyBlacklisted {
                reset_in_ms: u64::try_from(left.as_millis()).unwrap_or(u64::MAX),
            });
        }
        self.inner
            .get_candles(symbol, granularity_secs, start, end)
            .await
            .map_err(|e| self.handle_error(e))
    }
}

/// Middleware config for constructing a [`BlacklistingSource`].
pub struct BlacklistMiddleware {
    default_duration: Duration,
}

impl BlacklistMiddleware {
    /// Blacklist for `default_duration` when an error carries no reset hint.
    #[must_use]
    pub const fn new(default_duration: Duration) -> Self {
        Self { default_duration }
    }
}

impl SourceMiddleware for BlacklistMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn HistoricalSource>) -> Arc<dyn HistoricalSource> {
        Arc::new(BlacklistingSource::new(inner, self.default_duration))
    }

    fn name(&self) -> &'static str {
        "BlacklistingSource"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "default_duration_ms": u64::try_from(self.default_duration.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
