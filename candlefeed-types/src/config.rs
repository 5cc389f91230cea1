//! Configuration types shared by the feed, the gap filler and middleware.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::GranularityBand;

/// Backfill tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapFillConfig {
    /// Fraction of the expected candle count a non-empty chunk must reach.
    ///
    /// A chunk below this fraction marks the data horizon: no older chunks
    /// are requested for that gap. Sparse sources (markets with sessions)
    /// want a lower value, 24/7 sources can use up to ~0.98.
    pub coverage_tolerance: f64,
    /// Consecutive empty chunk responses that mark the data horizon.
    pub max_consecutive_empty: u32,
    /// Skip the fill when the missing fraction of the range is below this.
    pub skip_threshold: f64,
    /// Pause between chunks of one gap.
    pub chunk_delay: Duration,
    /// Pause between gap batches.
    pub batch_delay: Duration,
    /// Gaps fetched concurrently when there are more than `batch_width`.
    pub batch_width: usize,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            coverage_tolerance: 0.9,
            max_consecutive_empty: 3,
            skip_threshold: 0.10,
            chunk_delay: Duration::from_millis(100),
            batch_delay: Duration::from_millis(250),
            batch_width: 3,
        }
    }
}

/// Granularity selection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Bands in order, finest first.
    pub bands: Vec<GranularityBand>,
    /// Quiet period before a recommendation is applied.
    pub debounce: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            bands: GranularityBand::defaults(),
            debounce: Duration::from_millis(300),
        }
    }
}

/// In-memory buffer bounds. Cache retention is not affected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Hard cap on buffered candles.
    pub max_buffer_candles: usize,
    /// Extra candles kept beyond the visible range.
    pub margin_candles: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_buffer_candles: 5_000,
            margin_candles: 100,
        }
    }
}

/// Background warm-up of neighbouring granularities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PreloadConfig {
    /// Enable preloading after a transition.
    pub enabled: bool,
    /// Base delay between neighbour fills.
    pub stagger: Duration,
    /// Random jitter percentage [0, 100] added to each stagger delay.
    pub jitter_percent: u32,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stagger: Duration::from_millis(500),
            jitter_percent: 20,
        }
    }
}

/// Global configuration for a `CandleFeed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Backfill tuning.
    pub gap_fill: GapFillConfig,
    /// Granularity selection tuning.
    pub selector: SelectorConfig,
    /// In-memory buffer bounds.
    pub retention: RetentionConfig,
    /// Neighbour warm-up.
    pub preload: PreloadConfig,
    /// Window substituted when a requested range collapses after clipping.
    pub default_window: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            gap_fill: GapFillConfig::default(),
            selector: SelectorConfig::default(),
            retention: RetentionConfig::default(),
            preload: PreloadConfig::default(),
            default_window: Duration::from_secs(86_400),
        }
    }
}

/// Strategy for consuming units from a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum QuotaConsumptionStrategy {
    /// Each call deducts one unit from the window budget.
    #[default]
    Unit,
    /// The window is split into 24 slices with an even share each, so a
    /// backfill burst cannot drain the whole budget at once.
    EvenSpread,
}

/// Call budget for a historical source over a fixed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum calls per window.
    pub limit: u64,
    /// Accounting window.
    pub window: Duration,
    /// How calls consume the budget.
    pub strategy: QuotaConsumptionStrategy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: 1000,
            window: Duration::from_secs(60),
            strategy: QuotaConsumptionStrategy::Unit,
        }
    }
}
