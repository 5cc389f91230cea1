use std::time::Duration;

use candlefeed::{FeedError, FeedPhase, Granularity, TimeRange};
use candlefeed_mock::{HistoryBehavior, synthetic_candle};

use crate::helpers::{DAY, HOUR, Harness, NOW, SYMBOL};

#[tokio::test(start_paused = true)]
async fn visible_range_is_sorted_unique_and_aligned() {
    let h = Harness::new(500);
    let feed = h.feed();
    assert_eq!(feed.active_granularity(), Granularity::M5);

    let data = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert_eq!(data.granularity, Granularity::M5);
    assert_eq!(data.range, TimeRange { start: NOW - DAY, end: NOW });
    assert_eq!(data.candles.len(), 288);
    assert!(data.candles.windows(2).all(|w| w[0].time < w[1].time));
    assert!(data.candles.iter().all(|c| c.time % 300 == 0));
    assert_eq!(data.candles[0], synthetic_candle(NOW - DAY));
    assert_eq!(feed.phase(Granularity::M5), FeedPhase::Live);
    assert_eq!(feed.buffer_snapshot().len(), 288);
}

#[tokio::test(start_paused = true)]
async fn second_request_is_served_from_cache() {
    let h = Harness::new(500);
    let feed = h.feed();

    let first = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    let calls = h.source_ctl.call_count().await;
    assert!(calls > 0);

    let second = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert_eq!(h.source_ctl.call_count().await, calls);
    assert_eq!(first.candles, second.candles);
}

#[tokio::test(start_paused = true)]
async fn overlapping_request_fetches_only_the_new_part() {
    let h = Harness::new(500);
    let feed = h.feed();
    feed.get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    h.source_ctl.clear_calls().await;

    feed.get_data_for_visible_range(NOW - DAY - 6 * HOUR, NOW)
        .await
        .unwrap();
    let calls = h.source_ctl.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].start, Some(NOW - DAY - 6 * HOUR));
    assert_eq!(calls[0].end, Some(NOW - DAY));
}

#[tokio::test(start_paused = true)]
async fn end_in_the_future_is_clipped_to_now() {
    let h = Harness::new(500);
    let feed = h.feed();
    let data = feed
        .get_data_for_visible_range(NOW - 12 * HOUR, NOW + 6 * HOUR)
        .await
        .unwrap();
    assert_eq!(data.range.end, NOW);
    assert!(data.candles.iter().all(|c| c.time < NOW));
    assert_eq!(feed.visible_range(), Some(data.range));
}

#[tokio::test(start_paused = true)]
async fn collapsed_range_falls_back_to_default_window() {
    let h = Harness::new(500);
    let feed = h.feed();
    let data = feed
        .get_data_for_visible_range(NOW + HOUR, NOW + 2 * HOUR)
        .await
        .unwrap();
    assert_eq!(data.range, TimeRange { start: NOW - DAY, end: NOW });
    assert_eq!(data.candles.len(), 288);
}

#[tokio::test(start_paused = true)]
async fn source_failure_degrades_to_partial_data() {
    let h = Harness::new(100);
    let feed = h.feed();
    // 24h at 5m is three chunks; the oldest one fails.
    h.source_ctl
        .fail_call(3, FeedError::source_failed("mock-rest", "timeout"))
        .await;

    let data = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert_eq!(data.candles.len(), 200);
    assert_eq!(data.candles[0].time, NOW - 200 * 300);

    let again = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert_eq!(again.candles.len(), 288);
    assert_eq!(h.cache.snapshot(SYMBOL, Granularity::M5).await.len(), 288);
}

#[tokio::test(start_paused = true)]
async fn cache_read_failure_serves_the_buffer() {
    let h = Harness::new(500);
    let feed = h.feed();
    let first = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();

    h.cache
        .set_read_failure(Some(FeedError::cache("disk unavailable")))
        .await;
    let second = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert_eq!(second.candles, first.candles);
}

#[tokio::test(start_paused = true)]
async fn symbol_without_history_returns_promptly() {
    let h = Harness::new(500);
    h.source_ctl
        .set_behavior(SYMBOL, HistoryBehavior::Return(Vec::new()))
        .await;
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    feed.set_manual_granularity(Granularity::M1).await.unwrap();

    let started = tokio::time::Instant::now();
    let data = feed
        .get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(data.granularity, Granularity::M1);
    assert!(data.candles.is_empty());
    // 1440 buckets in chunks of 500, newest first; three empty answers end the walk.
    assert_eq!(h.source_ctl.call_count().await, 3);
    assert_eq!(feed.phase(Granularity::M1), FeedPhase::Live);
}
