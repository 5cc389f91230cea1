use std::collections::BTreeMap;

use candlefeed_types::{Candle, Granularity, TimeRange};

/// Insert `candle` into the ascending `series`, replacing any candle with the same `time`.
///
/// Returns `true` when a new bucket was inserted, `false` when an existing one was replaced.
pub fn upsert_candle(series: &mut Vec<Candle>, candle: Candle) -> bool {
    match series.binary_search_by_key(&candle.time, |c| c.time) {
        Ok(pos) => {
            series[pos] = candle;
            false
        }
        Err(pos) => {
            series.insert(pos, candle);
            true
        }
    }
}

/// Whether `candles` is strictly ascending and every candle is aligned and consistent.
#[must_use]
pub fn is_well_formed(candles: &[Candle], granularity: Granularity) -> bool {
    candles
        .iter()
        .all(|c| c.is_aligned(granularity) && c.is_consistent())
        && candles.windows(2).all(|w| w[0].time < w[1].time)
}

/// Keep only aligned, consistent candles (inside `within` when given), sorted
/// ascending with unique `time`. On duplicates the later candle wins.
#[must_use]
pub fn sanitize_candles(
    candles: Vec<Candle>,
    granularity: Granularity,
    within: Option<TimeRange>,
) -> Vec<Candle> {
    let mut by_time: BTreeMap<i64, Candle> = BTreeMap::new();
    for c in candles {
        if !c.is_aligned(granularity) || !c.is_consistent() {
            continue;
        }
        if within.is_some_and(|r| !r.contains(c.time)) {
            continue;
        }
        by_time.insert(c.time, c);
    }
    by_time.into_values().collect()
}
