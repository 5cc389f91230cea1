use std::sync::Arc;
use std::time::Duration;

use candlefeed_core::{Candle, FeedError, FeedPhase, Granularity, TimeRange, upsert_candle};

use super::FeedInner;

/// Candles returned for a visible-range request.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeData {
    /// Granularity the candles belong to.
    pub granularity: Granularity,
    /// Range actually served after clipping to now.
    pub range: TimeRange,
    /// Ascending, unique, aligned candles.
    pub candles: Vec<Candle>,
}

/// Clip `[start, end)` to `now`; a range that collapses becomes the default
/// window ending at the clipped end.
pub(crate) fn normalize_range(start: i64, end: i64, now: i64, default_window: Duration) -> TimeRange {
    let end = end.min(now);
    let start = if start >= end {
        let window = i64::try_from(default_window.as_secs())
            .unwrap_or(i64::MAX)
            .max(1);
        end.saturating_sub(window)
    } else {
        start
    };
    TimeRange { start, end }
}

impl FeedInner {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "candlefeed::feed::visible_range",
            skip(self),
            fields(symbol = %self.symbol),
        )
    )]
    pub(crate) async fn visible_range_data(
        self: &Arc<Self>,
        start: i64,
        end: i64,
    ) -> Result<RangeData, FeedError> {
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }
        let range = normalize_range(start, end, self.clock.now(), self.cfg.default_window);

        let (granularity, rearm) = {
            let mut state = self.state();
            state.visible = Some(range);
            let active = state.active;
            let mut rearm = None;
            if !state.manual {
                let recommended = self.selector.recommend(range.duration_hours(), active);
                if recommended == active {
                    state.pending = None;
                    rearm = Some(false);
                } else {
                    state.pending = Some(recommended);
                    rearm = Some(true);
                }
            }
            if state.phase(active) == FeedPhase::Idle {
                state.phases.insert(active, FeedPhase::Loading);
            }
            (active, rearm)
        };
        match rearm {
            Some(true) => self.arm_transition(),
            Some(false) => self.debounce.cancel(),
            None => {}
        }

        self.gap_filler.fill(&self.symbol, range, granularity).await;
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }

        let mut candles = self.read_range(range, granularity).await;
        {
            let open = {
                let agg = self.aggregator();
                agg.current().filter(|_| agg.granularity() == granularity)
            };
            let mut state = self.state();
            if let Some(open) = open.filter(|c| range.contains(c.time)) {
                upsert_candle(&mut candles, open);
            }
            state.phases.insert(granularity, FeedPhase::Live);
            if state.active == granularity {
                state.buffer.reset(granularity, candles.clone());
                let limit = self.retention_limit(&state);
                state.buffer.trim(limit);
            }
        }

        Ok(RangeData {
            granularity,
            range,
            candles,
        })
    }
}
