//! candlefeed-mock
//!
//! Deterministic collaborators for tests and demos:
//!
//! - [`MemoryCandleCache`]: a `BTreeMap`-backed `CandleCache` with failure injection.
//! - [`MockHistoricalSource`]: synthesizes candles on demand and lets tests
//!   script per-call failures, latency and a data horizon.
//! - [`ManualTickSource`]: a `TickSource` whose events are pushed from a controller.
//! - [`ManualClock`]: a settable `Clock`.
#![warn(missing_docs)]

mod cache;
mod clock;
mod source;
mod tick;

pub use cache::MemoryCandleCache;
pub use clock::ManualClock;
pub use source::{
    HistoryBehavior, MockHistoricalSource, MockSourceController, SourceCall, synthetic_candle,
};
pub use tick::{ManualTickSource, TickBehavior, TickController};
