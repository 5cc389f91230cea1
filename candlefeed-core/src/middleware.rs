//! Middleware trait for wrapping `HistoricalSource` implementations.

use std::sync::Arc;

use crate::connector::HistoricalSource;

/// Trait implemented by historical source middleware layers.
///
/// A middleware consumes an inner source and returns a wrapped source that
/// augments or restricts behavior (e.g., quotas, blacklisting).
pub trait SourceMiddleware: Send + Sync {
    /// Apply this middleware to wrap an inner source and return the wrapped source.
    fn apply(self: Box<Self>, inner: Arc<dyn HistoricalSource>) -> Arc<dyn HistoricalSource>;

    /// Human-readable middleware name for introspection/logging.
    fn name(&self) -> &'static str;

    /// Opaque configuration snapshot for serialization/inspection.
    fn config_json(&self) -> serde_json::Value;
}
