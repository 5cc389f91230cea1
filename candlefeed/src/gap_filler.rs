//! Gap detection and rate-aware backfill.
//!
//! A fill reads the cache for the requested range, turns the reported gaps
//! into request-sized chunks and fetches them from the historical source,
//! persisting every chunk as soon as it arrives. Fills are best effort: a
//! failing chunk abandons its gap only, and the next fill of an overlapping
//! range picks up whatever is still missing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use candlefeed_core::{
    Candle, CandleCache, Clock, FeedError, Gap, GapFillConfig, Granularity, HistoricalSource,
    SeriesKey, SingleFlight, TimeRange, WriteCoordinator, chunk_gap, clip_gaps, is_well_formed,
    merge_gaps, missing_fraction, sanitize_candles,
};
use futures::future::join_all;

/// Outcome of one [`GapFiller::fill`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Gaps left after clipping to `now` and merging.
    pub gaps: usize,
    /// Chunk requests that returned successfully.
    pub chunks_fetched: usize,
    /// Candles written to the cache.
    pub candles_stored: usize,
    /// The missing fraction was below the skip threshold; nothing was fetched.
    pub skipped: bool,
    /// At least one gap stopped at the data horizon.
    pub horizon_reached: bool,
    /// Gaps abandoned because of a source or cache failure, or cancellation.
    pub failed_gaps: usize,
    /// Most recent failure, if any.
    pub last_error: Option<FeedError>,
}

#[derive(Debug, Clone, Default)]
struct GapOutcome {
    chunks_fetched: usize,
    candles_stored: usize,
    horizon_reached: bool,
    error: Option<FeedError>,
}

type FillKey = (String, i64, i64, Granularity);

const SINGLE_BATCH_GAPS: usize = 3;

/// Shared state moved into single-flight futures.
struct Backfill {
    cache: Arc<dyn CandleCache>,
    source: Arc<dyn HistoricalSource>,
    clock: Arc<dyn Clock>,
    writes: Arc<WriteCoordinator>,
    cfg: GapFillConfig,
}

/// Detects and backfills missing ranges of a candle series.
pub struct GapFiller {
    backfill: Arc<Backfill>,
    inflight: SingleFlight<FillKey, GapOutcome>,
    generation: AtomicU64,
}

impl GapFiller {
    /// Create a gap filler writing through `writes`.
    pub fn new(
        cache: Arc<dyn CandleCache>,
        source: Arc<dyn HistoricalSource>,
        clock: Arc<dyn Clock>,
        writes: Arc<WriteCoordinator>,
        cfg: GapFillConfig,
    ) -> Self {
        Self {
            backfill: Arc::new(Backfill {
                cache,
                source,
                clock,
                writes,
                cfg,
            }),
            inflight: SingleFlight::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GapFillConfig {
        &self.backfill.cfg
    }

    /// Number of gap fetches currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.in_flight()
    }

    /// Backfill the gaps of `range` at `granularity`.
    ///
    /// Never fails: cache read failures degrade to a full-range gap, and
    /// source or cache write failures abandon the affected gap only.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "candlefeed::gap_filler::fill",
            skip(self),
            fields(start = range.start, end = range.end),
        )
    )]
    pub async fn fill(&self, symbol: &str, range: TimeRange, granularity: Granularity) -> FillReport {
        let generation = self.generation.load(Ordering::SeqCst);
        let cfg = &self.backfill.cfg;
        let mut report = FillReport::default();

        let (gaps, read_error) = self
            .detect_gaps(symbol, range, granularity, self.backfill.clock.now())
            .await;
        report.gaps = gaps.len();
        report.last_error = read_error;
        if gaps.is_empty() {
            return report;
        }

        let missing = missing_fraction(&gaps, range);
        if missing < cfg.skip_threshold {
            #[cfg(feature = "tracing")]
            tracing::debug!(missing, "missing fraction below skip threshold");
            report.skipped = true;
            return report;
        }

        // A handful of gaps always goes out together.
        let width = if gaps.len() <= SINGLE_BATCH_GAPS {
            gaps.len()
        } else {
            cfg.batch_width.max(1)
        };
        for (i, batch) in gaps.chunks(width).enumerate() {
            if i > 0 {
                tokio::time::sleep(cfg.batch_delay).await;
            }
            if self.generation.load(Ordering::SeqCst) != generation {
                report.failed_gaps += gaps.len() - i * width;
                report.last_error = Some(FeedError::Cancelled("fill".to_string()));
                break;
            }
            let outcomes =
                join_all(batch.iter().map(|gap| self.fill_gap(symbol, *gap, granularity))).await;
            for outcome in outcomes {
                match outcome {
                    Some(o) => {
                        report.chunks_fetched += o.chunks_fetched;
                        report.candles_stored += o.candles_stored;
                        report.horizon_reached |= o.horizon_reached;
                        if o.error.is_some() {
                            report.failed_gaps += 1;
                            report.last_error = o.error;
                        }
                    }
                    None => {
                        report.failed_gaps += 1;
                        report.last_error = Some(FeedError::Cancelled("gap fetch".to_string()));
                    }
                }
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            gaps = report.gaps,
            chunks = report.chunks_fetched,
            stored = report.candles_stored,
            failed = report.failed_gaps,
            horizon = report.horizon_reached,
            "fill finished"
        );
        report
    }

    /// Abort every in-flight gap fetch and stop running fills at their next batch.
    pub fn cancel_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inflight.cancel_all();
    }

    async fn detect_gaps(
        &self,
        symbol: &str,
        range: TimeRange,
        granularity: Granularity,
        now: i64,
    ) -> (Vec<Gap>, Option<FeedError>) {
        let (reported, error) = match self
            .backfill
            .cache
            .get_cached_candles(symbol, granularity, range.start, range.end)
            .await
        {
            Ok(cached) if is_well_formed(&cached.candles, granularity) => (cached.gaps, None),
            Ok(_) => (
                vec![range],
                Some(FeedError::Data("malformed cache response".to_string())),
            ),
            Err(err) => (vec![range], Some(err)),
        };
        #[cfg(feature = "tracing")]
        if let Some(err) = &error {
            tracing::warn!(error = %err, "cache read unusable; treating range as missing");
        }

        let within: Vec<Gap> = reported
            .into_iter()
            .filter_map(|g| {
                let start = g.start.max(range.start);
                let end = g.end.min(range.end);
                (start < end).then_some(TimeRange { start, end })
            })
            .collect();
        (merge_gaps(clip_gaps(within, now)), error)
    }

    async fn fill_gap(&self, symbol: &str, gap: Gap, granularity: Granularity) -> Option<GapOutcome> {
        let key = (symbol.to_string(), gap.start, gap.end, granularity);
        let backfill = Arc::clone(&self.backfill);
        let symbol = symbol.to_string();
        self.inflight
            .run(key, async move { backfill.fetch_gap(&symbol, gap, granularity).await })
            .await
    }
}

impl Backfill {
    #[allow(clippy::cast_precision_loss)]
    async fn fetch_gap(&self, symbol: &str, gap: Gap, granularity: Granularity) -> GapOutcome {
        let mut outcome = GapOutcome::default();
        let chunks = chunk_gap(gap, granularity, self.source.max_candles_per_request());
        let mut consecutive_empty = 0u32;

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.chunk_delay).await;
            }

            let fetched = match self
                .source
                .get_candles(
                    symbol,
                    granularity.seconds(),
                    Some(chunk.start),
                    Some(chunk.end),
                )
                .await
            {
                Ok(candles) => candles,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        symbol,
                        granularity = %granularity,
                        gap_start = gap.start,
                        chunk_start = chunk.start,
                        chunk_end = chunk.end,
                        error = %err,
                        "chunk fetch failed; abandoning gap"
                    );
                    outcome.error = Some(err);
                    return outcome;
                }
            };
            outcome.chunks_fetched += 1;

            let candles = sanitize_candles(fetched, granularity, Some(*chunk));
            if candles.is_empty() {
                consecutive_empty += 1;
                if consecutive_empty >= self.cfg.max_consecutive_empty.max(1) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        symbol,
                        granularity = %granularity,
                        chunk_start = chunk.start,
                        "consecutive empty chunks; data horizon reached"
                    );
                    outcome.horizon_reached = true;
                    break;
                }
                continue;
            }
            consecutive_empty = 0;

            let received = candles.len();
            let expected = chunk.bucket_count(granularity);
            match self.persist(symbol, granularity, candles).await {
                Ok(stored) => outcome.candles_stored += stored,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        symbol,
                        granularity = %granularity,
                        gap_start = gap.start,
                        error = %err,
                        "cache write failed; abandoning gap"
                    );
                    outcome.error = Some(err);
                    return outcome;
                }
            }

            if (received as f64) < self.cfg.coverage_tolerance * expected as f64 {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    symbol,
                    granularity = %granularity,
                    received,
                    expected,
                    "partial chunk; data horizon reached"
                );
                outcome.horizon_reached = true;
                break;
            }
        }
        outcome
    }

    /// Store `candles` under the series lock, skipping the bucket ticks are
    /// still building.
    async fn persist(
        &self,
        symbol: &str,
        granularity: Granularity,
        candles: Vec<Candle>,
    ) -> Result<usize, FeedError> {
        let mut guard = self.writes.lock(&SeriesKey::new(symbol, granularity)).await;
        guard.release_stale(self.clock.now(), granularity.seconds());
        let writable: Vec<Candle> = candles
            .into_iter()
            .filter(|c| guard.accepts_backfill(c.time))
            .collect();
        let stored = writable.len();
        if stored > 0 {
            self.cache.store_chunk(symbol, granularity, writable).await?;
        }
        drop(guard);
        Ok(stored)
    }
}
