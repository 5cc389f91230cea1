//! Layered construction of the historical source a feed backfills from.
//!
//! Layers wrap each other like an onion. The layer added last is the one the
//! gap filler talks to, and it sees errors from everything beneath it:
//!
//! ```text
//! SourceBuilder::new(rest).with_quota(..).with_blacklist(..)
//!
//!   gap filler -> Blacklist -> Quota -> rest client
//! ```
//!
//! Adding a layer kind that is already present replaces it and moves it to
//! the outside.

use std::sync::Arc;
use std::time::Duration;

use candlefeed_core::{HistoricalSource, QuotaConfig, SourceMiddleware};
use serde_json::json;

use crate::blacklist::BlacklistMiddleware;
use crate::quota::QuotaMiddleware;

const QUOTA: &str = "QuotaAwareSource";
const BLACKLIST: &str = "BlacklistingSource";

/// Composes a raw historical source with layered wrappers.
pub struct SourceBuilder {
    raw: Arc<dyn HistoricalSource>,
    /// Outermost first.
    layers: Vec<Box<dyn SourceMiddleware>>,
    quota: Option<QuotaConfig>,
}

impl SourceBuilder {
    /// Start from a raw, unwrapped source.
    #[must_use]
    pub fn new(raw: Arc<dyn HistoricalSource>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
            quota: None,
        }
    }

    fn push_outermost(&mut self, name: &str, layer: Box<dyn SourceMiddleware>) {
        self.layers.retain(|m| m.name() != name);
        self.layers.insert(0, layer);
    }

    /// Add or replace the quota layer at the outermost position.
    #[must_use]
    pub fn with_quota(mut self, cfg: &QuotaConfig) -> Self {
        self.push_outermost(QUOTA, Box::new(QuotaMiddleware::new(cfg.clone())));
        self.quota = Some(cfg.clone());
        self
    }

    /// Change only the call limit of the quota layer, adding one with default
    /// window and strategy if none exists yet.
    #[must_use]
    pub fn quota_limit(self, limit: u64) -> Self {
        let cfg = QuotaConfig {
            limit,
            ..self.quota.clone().unwrap_or_default()
        };
        self.with_quota(&cfg)
    }

    /// Remove the quota layer if present.
    #[must_use]
    pub fn without_quota(mut self) -> Self {
        self.layers.retain(|m| m.name() != QUOTA);
        self.quota = None;
        self
    }

    /// Add or replace the blacklist layer at the outermost position.
    ///
    /// Placed outside the quota layer it turns quota rejections into a
    /// cooldown instead of a stream of failing calls.
    #[must_use]
    pub fn with_blacklist(mut self, cooldown: Duration) -> Self {
        self.push_outermost(BLACKLIST, Box::new(BlacklistMiddleware::new(cooldown)));
        self
    }

    /// Remove the blacklist layer if present.
    #[must_use]
    pub fn without_blacklist(mut self) -> Self {
        self.layers.retain(|m| m.name() != BLACKLIST);
        self
    }

    /// Describe the stack outermost-first, ending with the raw source.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        let wrappers = self
            .layers
            .iter()
            .map(|l| json!({ "name": l.name(), "config": l.config_json() }));
        let raw = json!({ "name": "RawSource", "config": { "name": self.raw.name() } });
        serde_json::Value::Array(wrappers.chain(std::iter::once(raw)).collect())
    }

    /// Build the wrapped source, applying layers innermost first.
    #[must_use]
    pub fn build(self) -> Arc<dyn HistoricalSource> {
        self.layers
            .into_iter()
            .rev()
            .fold(self.raw, |inner, layer| layer.apply(inner))
    }
}
