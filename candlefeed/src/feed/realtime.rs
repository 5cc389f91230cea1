use std::sync::{Arc, Weak};

use candlefeed_core::{Candle, FeedError, Granularity, SeriesKey, Tick, TickEvent, TickStatus};
use tokio::sync::mpsc;

use super::FeedInner;
use super::subscribers::FeedEvent;
use crate::aggregator::AggregateUpdate;

impl FeedInner {
    /// Subscribe to the tick source and start the pump. Idempotent.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<(), FeedError> {
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }
        let Some(source) = self.tick_source.clone() else {
            return Err(FeedError::InvalidArg(
                "no tick source configured; add one via with_tick_source(...)".to_string(),
            ));
        };
        if self.stream.lock().expect("mutex poisoned").is_some() {
            return Ok(());
        }

        let (handle, rx) = source.subscribe(&self.symbol).await?;
        {
            let mut slot = self.stream.lock().expect("mutex poisoned");
            if slot.is_some() {
                // lost a race with a concurrent connect
                drop(slot);
                handle.abort();
                return Ok(());
            }
            *slot = Some(handle);
        }
        if self.is_destroyed() {
            if let Some(handle) = self.stream.lock().expect("mutex poisoned").take() {
                handle.abort();
            }
            return Err(FeedError::Destroyed);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(symbol = %self.symbol, source = source.name(), "tick stream connected");
        self.spawn_tracked(pump(Arc::downgrade(self), rx));
        Ok(())
    }

    /// Fold one tick into the open candle, write it through and notify.
    pub(crate) async fn on_tick(&self, tick: Tick) {
        let time = tick.time.unwrap_or_else(|| self.clock.now());

        // The aggregator may be retargeted while we wait for the series
        // lock; retry until the lock matches its granularity.
        let (update, series) = loop {
            let granularity = self.aggregator().granularity();
            let mut series = self
                .writes
                .lock(&SeriesKey::new(&self.symbol, granularity))
                .await;
            let bucket = granularity.align(time);
            let opens_bucket = self.aggregator().current().is_none_or(|c| c.time < bucket);
            // Backfill may already hold a partial candle for a bucket the
            // stream has not reached yet.
            let stored = if opens_bucket {
                self.stored_bucket(granularity, bucket).await
            } else {
                None
            };
            let applied = {
                let mut agg = self.aggregator();
                (agg.granularity() == granularity).then(|| {
                    let previous = agg.current();
                    let resumed = stored.is_some_and(|seed| agg.resume(seed));
                    agg.apply(time, tick.price, tick.kind, tick.volume)
                        .map(|mut update| {
                            if resumed {
                                update.is_new_bucket = true;
                                update.completed = previous;
                            }
                            update
                        })
                })
            };
            let Some(applied) = applied else {
                continue;
            };
            let Some(update) = applied else {
                return;
            };
            series.live_bucket = Some(update.candle.time);
            break (update, series);
        };

        if let Err(err) = self
            .cache
            .update_latest_candle(&self.symbol, update.granularity, update.candle)
            .await
        {
            super::warn_failure(&self.symbol, "live candle write-through failed", &err);
        }
        drop(series);

        self.buffer_update(&update);
        if let Some(done) = update.completed {
            self.subscribers
                .notify(&self.symbol, &FeedEvent::Completed(done));
        }
        self.subscribers.notify(
            &self.symbol,
            &FeedEvent::Candle {
                candle: update.candle,
                is_new_bucket: update.is_new_bucket,
            },
        );
    }

    async fn stored_bucket(&self, granularity: Granularity, bucket: i64) -> Option<Candle> {
        let cached = self
            .cache
            .get_cached_candles(&self.symbol, granularity, bucket, bucket + granularity.seconds())
            .await
            .ok()?;
        cached.candles.into_iter().find(|c| c.time == bucket)
    }

    /// Hand the open bucket back to backfill while no ticks can arrive.
    async fn release_live_bucket(&self) {
        let granularity = self.aggregator().granularity();
        self.writes
            .lock(&SeriesKey::new(&self.symbol, granularity))
            .await
            .live_bucket = None;
    }

    fn buffer_update(&self, update: &AggregateUpdate) {
        let mut state = self.state();
        if state.active != update.granularity || state.buffer.granularity() != update.granularity {
            return;
        }
        if let Some(done) = update.completed {
            state.buffer.upsert(done);
        }
        state.buffer.upsert(update.candle);
        let limit = self.retention_limit(&state);
        state.buffer.trim(limit);
    }

    /// Validate and store an externally produced candle for the active series.
    pub(crate) async fn append_candle(&self, candle: Candle) -> Result<(), FeedError> {
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }
        let granularity = self.state().active;
        if !candle.is_aligned(granularity) {
            return Err(FeedError::invalid_candle(
                candle.time,
                format!("not aligned to {granularity}"),
            ));
        }
        if !candle.is_consistent() {
            return Err(FeedError::invalid_candle(
                candle.time,
                "inconsistent OHLC values",
            ));
        }

        let series = self
            .writes
            .lock(&SeriesKey::new(&self.symbol, granularity))
            .await;
        self.cache
            .update_latest_candle(&self.symbol, granularity, candle)
            .await?;
        drop(series);

        let mut state = self.state();
        if state.buffer.granularity() == granularity {
            state.buffer.upsert(candle);
            let limit = self.retention_limit(&state);
            state.buffer.trim(limit);
        }
        Ok(())
    }
}

async fn pump(weak: Weak<FeedInner>, mut rx: mpsc::Receiver<TickEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = weak.upgrade() else {
            break;
        };
        if inner.is_destroyed() {
            break;
        }
        match event {
            TickEvent::Price(tick) => inner.on_tick(tick).await,
            TickEvent::Status(status) => {
                #[cfg(feature = "tracing")]
                tracing::info!(symbol = %inner.symbol, status = ?status, "tick source status");
                inner.state().status = Some(status);
                if status != TickStatus::Connected {
                    inner.release_live_bucket().await;
                }
                inner
                    .subscribers
                    .notify(&inner.symbol, &FeedEvent::Status(status));
            }
        }
    }
    #[cfg(feature = "tracing")]
    tracing::debug!("tick pump finished");
}
