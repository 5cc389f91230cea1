use std::sync::Arc;

use candlefeed_core::{Granularity, TimeRange};

use super::FeedInner;
use crate::backoff::jittered;

impl FeedInner {
    /// Neighbours of `granularity` worth warming for a view of `visible_hours`.
    ///
    /// The coarser neighbour is preloaded when the active band asks for it,
    /// the finer one only when the view would still fit its band.
    pub(crate) fn preload_targets(&self, granularity: Granularity, visible_hours: f64) -> Vec<Granularity> {
        let mut targets = Vec::with_capacity(2);
        if self.selector.band(granularity).is_some_and(|b| b.preload_next)
            && let Some(coarser) = granularity.coarser()
            && self.selector.band(coarser).is_some()
        {
            targets.push(coarser);
        }
        if let Some(finer) = granularity.finer()
            && self
                .selector
                .band(finer)
                .is_some_and(|b| visible_hours <= b.max_hours)
        {
            targets.push(finer);
        }
        targets
    }

    /// Fill the neighbours of `granularity` in the background, one at a time.
    pub(crate) fn schedule_preload(self: &Arc<Self>, granularity: Granularity, range: TimeRange) {
        let cfg = self.cfg.preload;
        if !cfg.enabled {
            return;
        }
        let targets = self.preload_targets(granularity, range.duration_hours());
        if targets.is_empty() {
            return;
        }
        let weak = Arc::downgrade(self);
        self.spawn_tracked(async move {
            for target in targets {
                tokio::time::sleep(jittered(cfg.stagger, cfg.jitter_percent)).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.is_destroyed() {
                    return;
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(symbol = %inner.symbol, target = %target, "preloading neighbour granularity");
                inner.gap_filler.fill(&inner.symbol, range, target).await;
            }
        });
    }
}
