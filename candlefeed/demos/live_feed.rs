use std::sync::Arc;
use std::time::Duration;

use candlefeed::{
    CandleCache, CandleFeed, Clock, FeedError, FeedEvent, QuotaConfig, SystemClock, Tick, TickStatus,
};
use candlefeed_mock::{ManualTickSource, MemoryCandleCache, MockHistoricalSource};
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Suggested: RUST_LOG=info,candlefeed=debug
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(MemoryCandleCache::new());
    let (rest, _rest_ctl) = MockHistoricalSource::new_with_controller("demo-rest", 300, Arc::clone(&clock));
    let (ws, ws_ctl) = ManualTickSource::new_with_controller("demo-ws");

    let feed = CandleFeed::builder()
        .symbol("BTC-USD")
        .with_cache(Arc::clone(&cache) as Arc<dyn CandleCache>)
        .with_source(rest)
        .with_tick_source(ws)
        .with_clock(Arc::clone(&clock))
        .quota(QuotaConfig::default())
        .blacklist(Duration::from_secs(30))
        .build()?;

    feed.subscribe(
        "printer",
        Arc::new(|event: &FeedEvent| -> Result<(), FeedError> {
            match event {
                FeedEvent::Candle { candle, is_new_bucket } => {
                    println!(
                        "live {} o={:.2} h={:.2} l={:.2} c={:.2}{}",
                        candle.time,
                        candle.open,
                        candle.high,
                        candle.low,
                        candle.close,
                        if *is_new_bucket { " (new)" } else { "" }
                    );
                }
                FeedEvent::Completed(candle) => println!("closed {}", candle.time),
                FeedEvent::GranularityChanged { from, to } => println!("granularity {from} -> {to}"),
                FeedEvent::Status(status) => println!("status {status:?}"),
            }
            Ok(())
        }),
    );
    feed.connect().await?;

    let now = clock.now();
    let day = feed.get_data_for_visible_range(now - 86_400, now).await?;
    println!("{} candles at {}", day.candles.len(), day.granularity);

    // Zoom out to a week; the feed moves to a coarser granularity after the quiet period.
    let week = feed
        .get_data_for_visible_range(now - 7 * 86_400, now)
        .await?;
    println!("{} candles at {}", week.candles.len(), week.granularity);
    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("active granularity: {}", feed.active_granularity());

    ws_ctl.push_status(TickStatus::Connected).await;
    for (i, price) in [101.0, 101.4, 100.9, 101.2].into_iter().enumerate() {
        let offset = i64::try_from(i).unwrap_or_default() * 20;
        ws_ctl.push_tick(Tick::trade(clock.now() + offset, price, 0.5)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let metadata = cache.get_metadata("BTC-USD").await?;
    println!("cached candles: {}", metadata.total_candles);

    feed.disconnect().await;
    Ok(())
}
