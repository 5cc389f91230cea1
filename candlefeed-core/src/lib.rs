//! candlefeed-core
//!
//! Core traits, primitives, and utilities shared across the candlefeed workspace.
//!
//! - `connector`: the `CandleCache`, `HistoricalSource` and `TickSource` collaborator traits.
//! - `clock`: injectable wall clock.
//! - `single_flight`: keyed request coalescing with cancellation.
//! - `writes`: per-series write serialization between ticks and backfill.
//! - `timeseries`: bucket alignment, gap detection and sorted-series helpers.
//!
//! Async runtime (Tokio)
//! ---------------------
//! Streaming and the concurrency primitives are coupled to Tokio:
//!
//! - `stream::StreamHandle` wraps `tokio::task::JoinHandle<()>` and uses
//!   `tokio::sync::oneshot::Sender<()>` for cooperative shutdown.
//! - `connector::TickSource` returns `(StreamHandle, tokio::sync::mpsc::Receiver<TickEvent>)`.
//! - `writes::WriteCoordinator` hands out `tokio::sync::OwnedMutexGuard`s.
//!
//! Code using these must run under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Injectable wall clock.
pub mod clock;
/// Collaborator traits for cache, historical source and tick source.
pub mod connector;
/// Middleware trait implemented by historical source wrappers.
pub mod middleware;
/// Keyed single-flight request coalescing.
pub mod single_flight;
/// Stream handle used by tick sources.
pub mod stream;
/// Time-series utilities for alignment, gaps and sorted series.
pub mod timeseries;
/// Per-series write serialization.
pub mod writes;

pub use candlefeed_types::*;
pub use clock::{Clock, SystemClock};
pub use connector::{CandleCache, HistoricalSource, TickSource};
pub use middleware::SourceMiddleware;
pub use single_flight::SingleFlight;
pub use stream::StreamHandle;
pub use timeseries::gaps::{chunk_gap, clip_gaps, find_gaps, merge_gaps, missing_fraction};
pub use timeseries::series::{is_well_formed, sanitize_candles, upsert_candle};
pub use writes::{SeriesKey, SeriesWriteGuard, WriteCoordinator};
