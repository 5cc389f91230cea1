use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use candlefeed_core::{Candle, FeedError, Granularity, TickStatus};

/// Event delivered to feed subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedEvent {
    /// The open candle of the active series changed.
    Candle {
        /// Open candle after the update.
        candle: Candle,
        /// `true` when the update opened a new bucket.
        is_new_bucket: bool,
    },
    /// A bucket closed because a newer one opened.
    Completed(Candle),
    /// A granularity transition finished.
    GranularityChanged {
        /// Previous granularity.
        from: Granularity,
        /// New active granularity.
        to: Granularity,
    },
    /// The tick source reported a connection status.
    Status(TickStatus),
}

/// Receiver of [`FeedEvent`]s.
///
/// Callbacks run on the thread that produced the event and must not block.
/// A callback that returns an error or panics is logged and skipped; the
/// remaining subscribers still receive the event.
pub trait FeedSubscriber: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    /// Any error is logged by the feed and otherwise ignored.
    fn on_event(&self, event: &FeedEvent) -> Result<(), FeedError>;
}

impl<F> FeedSubscriber for F
where
    F: Fn(&FeedEvent) -> Result<(), FeedError> + Send + Sync,
{
    fn on_event(&self, event: &FeedEvent) -> Result<(), FeedError> {
        self(event)
    }
}

type Entry = (String, Arc<dyn FeedSubscriber>);

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl SubscriberRegistry {
    /// Register `subscriber` under `id`. Returns `true` if it replaced one.
    pub(crate) fn insert(&self, id: String, subscriber: Arc<dyn FeedSubscriber>) -> bool {
        let mut entries = self.entries.lock().expect("mutex poisoned");
        if let Some(slot) = entries.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = subscriber;
            return true;
        }
        entries.push((id, subscriber));
        false
    }

    pub(crate) fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().expect("mutex poisoned");
        let before = entries.len();
        entries.retain(|(existing, _)| existing != id);
        entries.len() != before
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().expect("mutex poisoned").clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("mutex poisoned").len()
    }

    /// Deliver `event` to every subscriber in registration order.
    ///
    /// Returns the number of subscribers that failed.
    pub(crate) fn notify(&self, symbol: &str, event: &FeedEvent) -> usize {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let snapshot: Vec<Entry> = self.entries.lock().expect("mutex poisoned").clone();
        let mut failures = 0;
        for (id, subscriber) in snapshot {
            let failure = match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => FeedError::Subscriber {
                    id,
                    msg: err.to_string(),
                },
                Err(panic) => FeedError::Subscriber {
                    id,
                    msg: format!("panicked: {}", panic_message(panic.as_ref())),
                },
            };
            failures += 1;
            super::warn_failure(symbol, "subscriber callback failed", &failure);
        }
        failures
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}
