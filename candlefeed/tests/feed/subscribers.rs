use std::sync::Arc;
use std::time::Duration;

use candlefeed::{FeedError, FeedEvent, Granularity, Tick};

use crate::helpers::{Harness, NOW, Recorder, wait_until};

#[tokio::test(start_paused = true)]
async fn failing_subscribers_do_not_affect_others() {
    let h = Harness::new(500);
    let feed = h.feed();
    let before = Recorder::default();
    let after = Recorder::default();

    feed.subscribe("before", Arc::new(before.clone()));
    feed.subscribe(
        "erroring",
        Arc::new(|_: &FeedEvent| -> Result<(), FeedError> {
            Err(FeedError::Other("chart closed".into()))
        }),
    );
    feed.subscribe(
        "panicking",
        Arc::new(|_: &FeedEvent| -> Result<(), FeedError> { panic!("render bug") }),
    );
    feed.subscribe("after", Arc::new(after.clone()));

    feed.set_manual_granularity(Granularity::H1).await.unwrap();
    let expected = vec![FeedEvent::GranularityChanged {
        from: Granularity::M5,
        to: Granularity::H1,
    }];
    assert_eq!(before.events(), expected);
    assert_eq!(after.events(), expected);

    // The feed keeps delivering after the failures.
    feed.connect().await.unwrap();
    h.tick_ctl.push_tick(Tick::at(NOW, 5.0)).await;
    assert!(wait_until(|| after.len() == 2, Duration::from_secs(1)).await);
    assert_eq!(before.len(), 2);
}

#[tokio::test]
async fn subscribe_replaces_by_id_and_unsubscribe_removes() {
    let h = Harness::new(500);
    let feed = h.feed();
    let first = Recorder::default();
    let second = Recorder::default();

    assert!(!feed.subscribe("chart", Arc::new(first.clone())));
    assert!(feed.subscribe("chart", Arc::new(second.clone())));
    assert_eq!(feed.subscriber_count(), 1);

    feed.set_manual_granularity(Granularity::H1).await.unwrap();
    assert_eq!(first.len(), 0);
    assert_eq!(second.len(), 1);

    assert!(feed.unsubscribe("chart"));
    assert!(!feed.unsubscribe("chart"));
    feed.set_manual_granularity(Granularity::D1).await.unwrap();
    assert_eq!(second.len(), 1);
}
