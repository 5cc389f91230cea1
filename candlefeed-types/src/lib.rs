//! Candlefeed-specific data transfer objects and configuration primitives.
#![warn(missing_docs)]

mod candle;
mod config;
mod error;
mod granularity;
mod range;
mod tick;

pub use candle::Candle;
pub use config::{
    FeedConfig, GapFillConfig, PreloadConfig, QuotaConfig, QuotaConsumptionStrategy,
    RetentionConfig, SelectorConfig,
};
pub use error::FeedError;
pub use granularity::{Granularity, GranularityBand};
pub use range::{CacheMetadata, CachedRange, Gap, TimeRange};
pub use tick::{FeedPhase, Tick, TickEvent, TickKind, TickStatus};
