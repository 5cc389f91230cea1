use candlefeed_types::{Candle, Gap, Granularity, TimeRange};

/// Find the runs of buckets in `range` that have no candle in `candles`.
///
/// `candles` must be ascending by `time`. Each gap starts on a bucket boundary
/// and ends one bucket after its last missing bucket, clipped to `range.end`.
///
/// ```
/// use candlefeed_core::{find_gaps, Candle, Granularity, TimeRange};
///
/// let cached = vec![Candle::flat(60, 1.0), Candle::flat(120, 1.0), Candle::flat(300, 1.0)];
/// let gaps = find_gaps(&cached, TimeRange { start: 0, end: 360 }, Granularity::M1);
/// assert_eq!(gaps, vec![TimeRange { start: 0, end: 60 }, TimeRange { start: 180, end: 300 }]);
/// ```
#[must_use]
pub fn find_gaps(candles: &[Candle], range: TimeRange, granularity: Granularity) -> Vec<Gap> {
    let step = granularity.seconds();
    let mut gaps = Vec::new();
    let mut idx = candles.partition_point(|c| c.time < range.start);
    let mut run_start: Option<i64> = None;

    let mut t = granularity.align_up(range.start);
    while t < range.end {
        while idx < candles.len() && candles[idx].time < t {
            idx += 1;
        }
        let present = idx < candles.len() && candles[idx].time == t;
        match (present, run_start) {
            (false, None) => run_start = Some(t),
            (true, Some(start)) => {
                gaps.push(TimeRange { start, end: t });
                run_start = None;
            }
            _ => {}
        }
        t += step;
    }
    if let Some(start) = run_start {
        gaps.push(TimeRange {
            start,
            end: range.end,
        });
    }
    gaps
}

/// Drop gaps that start at or after `now` and clip the rest to end at `now`.
#[must_use]
pub fn clip_gaps(gaps: Vec<Gap>, now: i64) -> Vec<Gap> {
    gaps.into_iter()
        .filter(|g| g.start < now)
        .map(|g| TimeRange {
            start: g.start,
            end: g.end.min(now),
        })
        .filter(|g| g.start < g.end)
        .collect()
}

/// Merge overlapping or touching gaps; the result is sorted by `start`.
#[must_use]
pub fn merge_gaps(mut gaps: Vec<Gap>) -> Vec<Gap> {
    gaps.sort_by_key(|g| g.start);
    let mut merged: Vec<Gap> = Vec::with_capacity(gaps.len());
    for gap in gaps {
        match merged.last_mut() {
            Some(last) if gap.start <= last.end => last.end = last.end.max(gap.end),
            _ => merged.push(gap),
        }
    }
    merged
}

/// Split `gap` into request-sized chunks of at most `max_candles` buckets.
///
/// Chunks are returned newest first so a caller walking the list moves back in
/// time and can stop as soon as it reaches the data horizon.
#[must_use]
pub fn chunk_gap(gap: Gap, granularity: Granularity, max_candles: usize) -> Vec<TimeRange> {
    let step = granularity.seconds();
    let first = granularity.align_up(gap.start);
    if first >= gap.end {
        return Vec::new();
    }
    let per_chunk = i64::try_from(max_candles.max(1)).unwrap_or(i64::MAX);
    let span = per_chunk.saturating_sub(1).saturating_mul(step);

    let mut chunks = Vec::new();
    let mut end = gap.end;
    let mut last = granularity.align(gap.end - 1);
    while last >= first {
        let start = last.saturating_sub(span).max(first);
        chunks.push(TimeRange { start, end });
        end = start;
        last = start - step;
    }
    chunks
}

/// Share of `range` covered by `gaps`, in `[0, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn missing_fraction(gaps: &[Gap], range: TimeRange) -> f64 {
    let total = range.duration_secs();
    if total <= 0 {
        return 0.0;
    }
    let missing: i64 = gaps
        .iter()
        .map(|g| {
            let start = g.start.max(range.start);
            let end = g.end.min(range.end);
            (end - start).max(0)
        })
        .sum();
    (missing as f64 / total as f64).clamp(0.0, 1.0)
}
