//! candlefeed-middleware
//!
//! Wrappers around a [`HistoricalSource`](candlefeed_core::HistoricalSource):
//!
//! - [`QuotaAwareSource`]: enforces a call budget per window, optionally
//!   spread evenly over 24 slices.
//! - [`BlacklistingSource`]: stops calling the inner source for a while after
//!   it (or an inner quota layer) reports a rate limit.
//! - [`SourceBuilder`]: composes the layers in onion order.
#![warn(missing_docs)]

mod blacklist;
mod builder;
mod quota;

pub use crate::blacklist::{BlacklistMiddleware, BlacklistingSource};
pub use crate::builder::SourceBuilder;
pub use crate::quota::{QuotaAwareSource, QuotaMiddleware};
