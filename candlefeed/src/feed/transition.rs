use std::sync::Arc;

use candlefeed_core::{FeedError, FeedPhase, Granularity, SeriesKey};

use super::FeedInner;
use super::subscribers::FeedEvent;

impl FeedInner {
    /// (Re)start the debounce timer for the pending recommendation.
    pub(crate) fn arm_transition(self: &Arc<Self>) {
        if self.is_destroyed() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.debounce.arm(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let task = Arc::clone(&inner);
            inner.spawn_tracked(async move { task.run_auto_transition().await });
        });
    }

    async fn run_auto_transition(self: Arc<Self>) {
        if self.is_destroyed() {
            return;
        }
        // A transition already running re-arms on completion if needed.
        let Ok(guard) = self.transition_lock.try_lock() else {
            return;
        };
        let target = {
            let state = self.state();
            match state.pending {
                Some(target) if !state.manual && target != state.active => Some(target),
                _ => None,
            }
        };
        if let Some(target) = target {
            self.apply_transition(target).await;
        }
        drop(guard);
        self.rearm_if_pending();
    }

    fn rearm_if_pending(self: &Arc<Self>) {
        if self.is_destroyed() {
            return;
        }
        let pending = {
            let state = self.state();
            !state.manual && state.pending.is_some_and(|p| p != state.active)
        };
        if pending {
            self.arm_transition();
        }
    }

    /// Switch the active series to `target`. Callers hold `transition_lock`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "candlefeed::feed::transition",
            skip(self),
            fields(symbol = %self.symbol),
        )
    )]
    pub(crate) async fn apply_transition(self: &Arc<Self>, target: Granularity) {
        let range = self.visible_or_default();
        let from = {
            let mut state = self.state();
            state.phases.insert(target, FeedPhase::Loading);
            state.active
        };
        #[cfg(feature = "tracing")]
        tracing::info!(from = %from, to = %target, "granularity transition started");

        self.gap_filler.fill(&self.symbol, range, target).await;
        if self.is_destroyed() {
            return;
        }
        let candles = self.read_range(range, target).await;
        let open_bucket = target.align(self.clock.now());
        let seed = candles.last().copied().filter(|c| c.time == open_bucket);

        // Backfill of the old series may write the bucket ticks no longer update.
        if from != target {
            self.writes
                .lock(&SeriesKey::new(&self.symbol, from))
                .await
                .live_bucket = None;
        }
        {
            let _series = self.writes.lock(&SeriesKey::new(&self.symbol, target)).await;
            self.aggregator().retarget(target, seed);
            let mut state = self.state();
            state.active = target;
            if state.pending == Some(target) {
                state.pending = None;
            }
            state.buffer.reset(target, candles);
            let limit = self.retention_limit(&state);
            state.buffer.trim(limit);
            state.phases.insert(target, FeedPhase::Live);
        }

        if from != target {
            self.subscribers.notify(
                &self.symbol,
                &FeedEvent::GranularityChanged { from, to: target },
            );
        }
        self.schedule_preload(target, range);
    }

    pub(crate) async fn set_manual(self: &Arc<Self>, target: Granularity) -> Result<(), FeedError> {
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }
        {
            let mut state = self.state();
            state.manual = true;
            state.pending = None;
        }
        self.debounce.cancel();

        let _guard = self.transition_lock.lock().await;
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }
        let active = self.state().active;
        if active != target {
            self.apply_transition(target).await;
        }
        if self.is_destroyed() {
            return Err(FeedError::Destroyed);
        }
        Ok(())
    }

    pub(crate) fn enable_auto(self: &Arc<Self>) {
        let rearm = {
            let mut state = self.state();
            state.manual = false;
            let active = state.active;
            let recommended = state
                .visible
                .map(|r| self.selector.recommend(r.duration_hours(), active))
                .filter(|g| *g != active);
            state.pending = recommended;
            recommended.is_some()
        };
        if rearm {
            self.arm_transition();
        }
    }
}
