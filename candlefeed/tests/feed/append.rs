use candlefeed::{Candle, FeedError, Granularity};

use crate::helpers::{Harness, NOW, SYMBOL};

#[tokio::test]
async fn valid_candle_is_stored_and_buffered() {
    let h = Harness::new(500);
    let feed = h.feed();
    let candle = Candle::new(NOW - 300, 10.0, 12.0, 9.5, 11.0).with_volume(3.0);

    feed.append_candle(candle).await.unwrap();
    assert_eq!(h.cache.snapshot(SYMBOL, Granularity::M5).await, vec![candle]);
    assert_eq!(feed.buffer_snapshot(), vec![candle]);
    assert_eq!(h.cache.latest_write_count().await, 1);
}

#[tokio::test]
async fn misaligned_candle_is_rejected() {
    let h = Harness::new(500);
    let feed = h.feed();
    let err = feed
        .append_candle(Candle::flat(NOW - 240, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::InvalidCandle { time, .. } if time == NOW - 240));
    assert!(h.cache.snapshot(SYMBOL, Granularity::M5).await.is_empty());
}

#[tokio::test]
async fn inconsistent_candle_is_rejected() {
    let h = Harness::new(500);
    let feed = h.feed();
    let err = feed
        .append_candle(Candle::new(NOW, 10.0, 9.0, 11.0, 10.0))
        .await
        .unwrap_err();
    assert!(matches!(err, FeedError::InvalidCandle { .. }));
    assert!(feed.buffer_snapshot().is_empty());
}

#[tokio::test]
async fn cache_write_failure_is_returned() {
    let h = Harness::new(500);
    let feed = h.feed();
    h.cache
        .set_write_failure(Some(FeedError::cache("quota exhausted")))
        .await;
    let err = feed
        .append_candle(Candle::flat(NOW, 1.0))
        .await
        .unwrap_err();
    assert_eq!(err, FeedError::cache("quota exhausted"));
    assert!(feed.buffer_snapshot().is_empty());
}
