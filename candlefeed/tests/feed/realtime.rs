use std::sync::Arc;
use std::time::Duration;

use candlefeed::{Candle, FeedError, FeedEvent, Granularity, Tick, TickStatus};
use candlefeed_mock::{TickBehavior, synthetic_candle};

use crate::helpers::{HOUR, Harness, NOW, Recorder, SYMBOL, settle, wait_until};

fn ohlc(c: &Candle) -> (i64, f64, f64, f64, f64) {
    (c.time, c.open, c.high, c.low, c.close)
}

#[tokio::test(start_paused = true)]
async fn ticks_build_and_complete_candles() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));
    feed.connect().await.unwrap();

    h.tick_ctl.push_tick(Tick::at(NOW, 100.0)).await;
    h.tick_ctl.push_tick(Tick::at(NOW + 10, 101.5)).await;
    h.tick_ctl.push_tick(Tick::at(NOW + 70, 99.0)).await;
    assert!(wait_until(|| recorder.len() == 4, Duration::from_secs(1)).await);

    let events = recorder.events();
    let FeedEvent::Candle { candle, is_new_bucket } = events[0] else {
        panic!("expected candle update, got {:?}", events[0]);
    };
    assert!(is_new_bucket);
    assert_eq!(ohlc(&candle), (NOW, 100.0, 100.0, 100.0, 100.0));

    let FeedEvent::Candle { candle, is_new_bucket } = events[1] else {
        panic!("expected candle update, got {:?}", events[1]);
    };
    assert!(!is_new_bucket);
    assert_eq!(ohlc(&candle), (NOW, 100.0, 101.5, 100.0, 101.5));

    let FeedEvent::Completed(done) = events[2] else {
        panic!("expected completed candle, got {:?}", events[2]);
    };
    assert_eq!(ohlc(&done), (NOW, 100.0, 101.5, 100.0, 101.5));

    let FeedEvent::Candle { candle, is_new_bucket } = events[3] else {
        panic!("expected candle update, got {:?}", events[3]);
    };
    assert!(is_new_bucket);
    assert_eq!(ohlc(&candle), (NOW + 60, 99.0, 99.0, 99.0, 99.0));

    // Written through to the cache and visible in the buffer.
    let stored = h.cache.snapshot(SYMBOL, Granularity::M1).await;
    assert_eq!(stored.iter().map(ohlc).collect::<Vec<_>>(), vec![
        (NOW, 100.0, 101.5, 100.0, 101.5),
        (NOW + 60, 99.0, 99.0, 99.0, 99.0),
    ]);
    assert_eq!(feed.live_candle().map(|c| c.time), Some(NOW + 60));
    assert_eq!(feed.buffer_snapshot().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn late_ticks_are_ignored() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));
    feed.connect().await.unwrap();

    h.tick_ctl.push_tick(Tick::at(NOW + 60, 10.0)).await;
    h.tick_ctl.push_tick(Tick::at(NOW + 5, 50.0)).await;
    h.tick_ctl.push_tick(Tick::at(NOW + 61, 11.0)).await;
    assert!(wait_until(|| recorder.len() == 2, Duration::from_secs(1)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), 2);
    assert_eq!(feed.live_candle().map(|c| c.high), Some(11.0));
}

#[tokio::test(start_paused = true)]
async fn ticks_without_time_use_the_feed_clock() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    feed.connect().await.unwrap();
    h.clock.set(NOW + 125);
    h.tick_ctl.push_tick(Tick::mid(42.0)).await;
    assert!(
        wait_until(
            || feed.live_candle().is_some_and(|c| c.time == NOW + 120),
            Duration::from_secs(1)
        )
        .await
    );
}

#[tokio::test(start_paused = true)]
async fn visible_range_includes_the_open_candle() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    feed.connect().await.unwrap();
    h.clock.set(NOW + 90);
    h.tick_ctl.push_tick(Tick::trade(NOW + 65, 123.0, 2.0)).await;
    assert!(wait_until(|| feed.live_candle().is_some(), Duration::from_secs(1)).await);

    let data = feed
        .get_data_for_visible_range(NOW - 2 * HOUR, NOW + 90)
        .await
        .unwrap();
    let last = *data.candles.last().unwrap();
    assert_eq!(last.time, NOW + 60);
    assert_eq!(last.close, 123.0);
    assert_eq!(last.volume, Some(2.0));
    // Backfill never replaced the tick-owned bucket.
    let stored = h.cache.snapshot(SYMBOL, Granularity::M1).await;
    assert_eq!(stored.last().map(|c| c.close), Some(123.0));
}

#[tokio::test(start_paused = true)]
async fn history_after_a_dropped_stream_is_backfilled_once() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));
    feed.connect().await.unwrap();

    h.tick_ctl.push_tick(Tick::trade(NOW, 50.0, 1.0)).await;
    h.tick_ctl.push_status(TickStatus::Disconnected).await;
    assert!(wait_until(|| recorder.len() == 2, Duration::from_secs(1)).await);
    h.clock.set(NOW + 2 * HOUR);

    let first = feed
        .get_data_for_visible_range(NOW - HOUR, NOW + 2 * HOUR)
        .await
        .unwrap();
    assert_eq!(first.candles.len(), 180);
    let calls = h.source_ctl.call_count().await;
    assert!(calls > 0);

    let stored = h.cache.snapshot(SYMBOL, Granularity::M1).await;
    assert_eq!(stored.iter().filter(|c| c.time > NOW).count(), 119);
    // The bucket the stream built is kept.
    let own = stored.iter().find(|c| c.time == NOW).unwrap();
    assert_eq!(own.close, 50.0);

    let second = feed
        .get_data_for_visible_range(NOW - HOUR, NOW + 2 * HOUR)
        .await
        .unwrap();
    assert_eq!(second.candles.len(), 180);
    assert_eq!(h.source_ctl.call_count().await, calls);
}

#[tokio::test(start_paused = true)]
async fn quiet_stream_releases_its_bucket_to_backfill() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    feed.connect().await.unwrap();
    h.tick_ctl.push_tick(Tick::trade(NOW - 2 * 60, 50.0, 1.0)).await;
    assert!(wait_until(|| feed.live_candle().is_some(), Duration::from_secs(1)).await);

    // Still connected, but the clock has moved past the last ticked bucket.
    let data = feed
        .get_data_for_visible_range(NOW - HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(data.candles.len(), 60);
    let stored = h.cache.snapshot(SYMBOL, Granularity::M1).await;
    assert_eq!(stored.len(), 60);
    assert!(stored.iter().any(|c| c.time == NOW - 60));
}

#[tokio::test(start_paused = true)]
async fn tick_continues_a_backfilled_bucket() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));
    h.clock.set(NOW + 90);
    feed.get_data_for_visible_range(NOW - HOUR, NOW + 90)
        .await
        .unwrap();
    let backfilled = synthetic_candle(NOW + 60);
    assert!(
        h.cache
            .snapshot(SYMBOL, Granularity::M1)
            .await
            .contains(&backfilled)
    );

    feed.connect().await.unwrap();
    h.tick_ctl
        .push_tick(Tick::trade(NOW + 75, backfilled.high + 1.0, 2.0))
        .await;
    assert!(wait_until(|| recorder.len() == 1, Duration::from_secs(1)).await);
    settle().await;

    let FeedEvent::Candle { candle, is_new_bucket } = recorder.events()[0] else {
        panic!("expected candle update, got {:?}", recorder.events()[0]);
    };
    assert!(is_new_bucket);
    assert_eq!(candle.time, NOW + 60);
    assert_eq!(candle.open, backfilled.open);
    assert_eq!(candle.low, backfilled.low);
    assert_eq!(candle.high, backfilled.high + 1.0);
    assert_eq!(candle.volume, Some(backfilled.volume.unwrap() + 2.0));
}

#[tokio::test(start_paused = true)]
async fn status_events_are_forwarded() {
    let h = Harness::new(500);
    let feed = h.feed();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));
    feed.connect().await.unwrap();

    h.tick_ctl.push_status(TickStatus::Reconnecting).await;
    assert!(wait_until(|| recorder.len() == 1, Duration::from_secs(1)).await);
    assert_eq!(recorder.events(), vec![FeedEvent::Status(TickStatus::Reconnecting)]);
    assert_eq!(feed.tick_status(), Some(TickStatus::Reconnecting));
}

#[tokio::test(start_paused = true)]
async fn write_through_failures_do_not_stop_the_stream() {
    let h = Harness::new(500);
    let feed = h
        .builder()
        .initial_granularity(Granularity::M1)
        .build()
        .unwrap();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));
    feed.connect().await.unwrap();
    h.cache
        .set_write_failure(Some(FeedError::cache("read-only")))
        .await;

    h.tick_ctl.push_tick(Tick::at(NOW, 1.0)).await;
    h.tick_ctl.push_tick(Tick::at(NOW + 1, 2.0)).await;
    assert!(wait_until(|| recorder.len() == 2, Duration::from_secs(1)).await);
    assert!(h.cache.snapshot(SYMBOL, Granularity::M1).await.is_empty());
    assert_eq!(feed.live_candle().map(|c| c.close), Some(2.0));
}

#[tokio::test]
async fn connect_is_idempotent() {
    let h = Harness::new(500);
    let feed = h.feed();
    feed.connect().await.unwrap();
    feed.connect().await.unwrap();
    assert_eq!(h.tick_ctl.subscriptions().await, vec![SYMBOL.to_string()]);
}

#[tokio::test]
async fn connect_requires_a_tick_source() {
    let h = Harness::new(500);
    let feed = candlefeed::CandleFeed::builder()
        .symbol(SYMBOL)
        .with_cache(Arc::clone(&h.cache) as Arc<dyn candlefeed::CandleCache>)
        .with_source(Arc::clone(&h.source))
        .build()
        .unwrap();
    assert!(matches!(
        feed.connect().await,
        Err(FeedError::InvalidArg(_))
    ));
}

#[tokio::test]
async fn subscription_failure_is_reported() {
    let h = Harness::new(500);
    let feed = h.feed();
    h.tick_ctl
        .set_behavior(TickBehavior::Fail(FeedError::Other("socket refused".into())))
        .await;
    assert_eq!(
        feed.connect().await,
        Err(FeedError::Other("socket refused".into()))
    );
}
