use std::sync::Arc;
use std::time::Duration;

use candlefeed::{FeedEvent, FeedPhase, Granularity, PreloadConfig};

use crate::helpers::{DAY, HOUR, Harness, NOW, Recorder, SYMBOL, settle, wait_until};

#[tokio::test(start_paused = true)]
async fn bursts_of_requests_apply_only_the_last_recommendation() {
    let h = Harness::new(1_000);
    let feed = h.feed();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));

    // 100h -> 15m, 300h -> 1h, 1000h -> 6h, all within the quiet period.
    for hours in [100, 300, 1_000] {
        feed.get_data_for_visible_range(NOW - hours * HOUR, NOW)
            .await
            .unwrap();
    }
    assert_eq!(feed.active_granularity(), Granularity::M5);
    assert_eq!(feed.pending_granularity(), Some(Granularity::H6));

    assert!(
        wait_until(
            || feed.active_granularity() == Granularity::H6,
            Duration::from_secs(5)
        )
        .await
    );
    settle().await;
    assert_eq!(
        recorder.granularity_changes(),
        vec![FeedEvent::GranularityChanged {
            from: Granularity::M5,
            to: Granularity::H6,
        }]
    );
    assert_eq!(feed.pending_granularity(), None);
    assert_eq!(feed.phase(Granularity::H6), FeedPhase::Live);
    assert!(h.cache.snapshot(SYMBOL, Granularity::M15).await.is_empty());
    assert!(h.cache.snapshot(SYMBOL, Granularity::H1).await.is_empty());

    let buffered = feed.buffer_snapshot();
    assert!(!buffered.is_empty());
    assert!(buffered.iter().all(|c| c.time % (6 * HOUR) == 0));
}

#[tokio::test(start_paused = true)]
async fn overlapping_bands_hold_the_current_granularity() {
    let h = Harness::new(1_000);
    let feed = h.feed();

    // 40h sits in both the 5m and 15m bands: keep 5m.
    feed.get_data_for_visible_range(NOW - 40 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), None);

    // 60h leaves the 5m band.
    feed.get_data_for_visible_range(NOW - 60 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::M15));
    assert!(
        wait_until(
            || feed.active_granularity() == Granularity::M15,
            Duration::from_secs(5)
        )
        .await
    );

    // Back to 40h: still inside the 15m band, so no flip back.
    feed.get_data_for_visible_range(NOW - 40 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), None);
    settle().await;
    assert_eq!(feed.active_granularity(), Granularity::M15);

    // 30h is below the 15m band.
    feed.get_data_for_visible_range(NOW - 30 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::M5));
}

#[tokio::test(start_paused = true)]
async fn returning_to_the_active_band_cancels_a_pending_change() {
    let h = Harness::new(1_000);
    let feed = h.feed();
    feed.get_data_for_visible_range(NOW - 100 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::M15));
    feed.get_data_for_visible_range(NOW - DAY, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), None);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(feed.active_granularity(), Granularity::M5);
}

#[tokio::test(start_paused = true)]
async fn manual_granularity_overrides_selection_until_auto_is_restored() {
    let h = Harness::new(1_000);
    let feed = h.feed();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));

    feed.set_manual_granularity(Granularity::H1).await.unwrap();
    assert!(feed.is_manual());
    assert_eq!(feed.active_granularity(), Granularity::H1);

    // A 2h view would recommend 1m, but manual mode ignores it.
    let data = feed
        .get_data_for_visible_range(NOW - 2 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(data.granularity, Granularity::H1);
    assert_eq!(data.candles.len(), 2);
    assert_eq!(feed.pending_granularity(), None);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(feed.active_granularity(), Granularity::H1);

    feed.enable_auto_granularity();
    assert!(!feed.is_manual());
    assert_eq!(feed.pending_granularity(), Some(Granularity::M1));
    assert!(
        wait_until(
            || feed.active_granularity() == Granularity::M1,
            Duration::from_secs(5)
        )
        .await
    );
    settle().await;
    assert_eq!(
        recorder.granularity_changes(),
        vec![
            FeedEvent::GranularityChanged {
                from: Granularity::M5,
                to: Granularity::H1,
            },
            FeedEvent::GranularityChanged {
                from: Granularity::H1,
                to: Granularity::M1,
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn manual_switch_cancels_a_pending_automatic_change() {
    let h = Harness::new(1_000);
    let feed = h.feed();
    feed.get_data_for_visible_range(NOW - 100 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::M15));

    feed.set_manual_granularity(Granularity::D1).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(feed.active_granularity(), Granularity::D1);
    assert!(h.cache.snapshot(SYMBOL, Granularity::M15).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transition_preloads_neighbouring_granularities() {
    let h = Harness::new(1_000);
    let feed = h
        .builder()
        .preload(PreloadConfig {
            enabled: true,
            stagger: Duration::from_millis(100),
            jitter_percent: 0,
        })
        .build()
        .unwrap();

    // 100h moves the view to 15m. The coarser 1h series is preloaded; 5m is
    // skipped because 100h is past the top of its band.
    feed.get_data_for_visible_range(NOW - 100 * HOUR, NOW)
        .await
        .unwrap();
    assert!(
        wait_until(
            || feed.active_granularity() == Granularity::M15,
            Duration::from_secs(5)
        )
        .await
    );
    let mut preloaded = false;
    for _ in 0..200 {
        if h.cache.snapshot(SYMBOL, Granularity::H1).await.len() == 100 {
            preloaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(preloaded);
    // The 5m series only holds what the visible request itself loaded.
    assert_eq!(
        h.cache.snapshot(SYMBOL, Granularity::M5).await.len(),
        1_200
    );
}

#[tokio::test(start_paused = true)]
async fn old_granularity_keeps_serving_while_a_transition_loads() {
    let h = Harness::new(1_000);
    let feed = h.feed();
    feed.get_data_for_visible_range(NOW - 100 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::M15));

    h.source_ctl.set_latency(Some(Duration::from_secs(10))).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(feed.phase(Granularity::M15), FeedPhase::Loading);

    let started = tokio::time::Instant::now();
    let data = feed
        .get_data_for_visible_range(NOW - 100 * HOUR, NOW)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(data.granularity, Granularity::M5);
    assert_eq!(data.candles.len(), 1_200);
    assert_eq!(feed.active_granularity(), Granularity::M5);
    assert_eq!(feed.phase(Granularity::M15), FeedPhase::Loading);

    assert!(
        wait_until(
            || feed.active_granularity() == Granularity::M15,
            Duration::from_secs(60)
        )
        .await
    );
    assert_eq!(feed.phase(Granularity::M15), FeedPhase::Live);
}

#[tokio::test(start_paused = true)]
async fn recommendation_waits_for_the_running_transition() {
    let h = Harness::new(1_000);
    let feed = h.feed();
    let recorder = Recorder::default();
    feed.subscribe("rec", Arc::new(recorder.clone()));

    // Load 5m for the widest view first so later 5m reads are cache hits.
    feed.get_data_for_visible_range(NOW - 300 * HOUR, NOW)
        .await
        .unwrap();
    feed.get_data_for_visible_range(NOW - 100 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::M15));

    h.source_ctl.set_latency(Some(Duration::from_secs(10))).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(feed.phase(Granularity::M15), FeedPhase::Loading);

    // 300h asks for 1h while the 15m transition is still loading.
    feed.get_data_for_visible_range(NOW - 300 * HOUR, NOW)
        .await
        .unwrap();
    assert_eq!(feed.pending_granularity(), Some(Granularity::H1));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(feed.active_granularity(), Granularity::M5);
    assert_eq!(feed.phase(Granularity::H1), FeedPhase::Idle);
    assert_eq!(feed.pending_granularity(), Some(Granularity::H1));

    assert!(
        wait_until(
            || feed.active_granularity() == Granularity::H1,
            Duration::from_secs(120)
        )
        .await
    );
    settle().await;
    assert_eq!(
        recorder.granularity_changes(),
        vec![
            FeedEvent::GranularityChanged {
                from: Granularity::M5,
                to: Granularity::M15,
            },
            FeedEvent::GranularityChanged {
                from: Granularity::M15,
                to: Granularity::H1,
            },
        ]
    );
}
