use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the candlefeed workspace.
///
/// Collaborators (cache, historical source, tick source) report failures with
/// it; the feed itself only surfaces it from caller-driven operations such as
/// `append_candle`, since backfill and delivery failures are absorbed.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedError {
    /// A historical or tick source call failed.
    #[error("{source_name} failed: {msg}")]
    Source {
        /// Source name that failed.
        source_name: String,
        /// Human-readable error message.
        msg: String,
    },

    /// The candle cache failed a read or write.
    #[error("cache error: {0}")]
    Cache(String),

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A candle violates OHLC consistency or bucket alignment.
    #[error("invalid candle at {time}: {reason}")]
    InvalidCandle {
        /// Bucket start of the rejected candle.
        time: i64,
        /// What is wrong with it.
        reason: String,
    },

    /// Returned data was malformed.
    #[error("data issue: {0}")]
    Data(String),

    /// The call exceeds the configured quota budget for the current window.
    #[error("quota exceeded: remaining={remaining} reset_in_ms={reset_in_ms}")]
    QuotaExceeded {
        /// Remaining units at the time of rejection.
        remaining: u64,
        /// Milliseconds until the window or slice resets.
        reset_in_ms: u64,
    },

    /// The upstream source reported a rate limit.
    #[error("rate limit exceeded: limit={limit} window_ms={window_ms}")]
    RateLimitExceeded {
        /// Allowed requests in the window.
        limit: u64,
        /// Window length in milliseconds.
        window_ms: u64,
    },

    /// The source is blacklisted by middleware; retry after `reset_in_ms`.
    #[error("temporarily blacklisted: reset_in_ms={reset_in_ms}")]
    TemporarilyBlacklisted {
        /// Milliseconds until the blacklist elapses.
        reset_in_ms: u64,
    },

    /// The operation was cancelled before completing.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The feed has been disconnected.
    #[error("feed destroyed")]
    Destroyed,

    /// A subscriber callback reported a failure.
    #[error("subscriber {id} failed: {msg}")]
    Subscriber {
        /// Subscriber id.
        id: String,
        /// Failure description.
        msg: String,
    },

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl FeedError {
    /// Helper: build a `Source` error.
    pub fn source_failed(source_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            source_name: source_name.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Cache` error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Helper: build an `InvalidCandle` error.
    pub fn invalid_candle(time: i64, reason: impl Into<String>) -> Self {
        Self::InvalidCandle {
            time,
            reason: reason.into(),
        }
    }

    /// True for quota, rate-limit and blacklist rejections.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded { .. }
                | Self::RateLimitExceeded { .. }
                | Self::TemporarilyBlacklisted { .. }
        )
    }
}
