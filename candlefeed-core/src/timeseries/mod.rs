//! Time-series utilities shared by the cache, the gap filler and the feed.
//!
//! Modules include:
//! - `gaps`: detect, clip, merge and chunk missing ranges
//! - `series`: keep candle vectors sorted, unique and well formed
/// Gap detection and request planning.
pub mod gaps;
/// Sorted-series helpers.
pub mod series;
