use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Cancellable one-shot timer that restarts on every `arm`.
///
/// Only the sleep is abortable: once the delay elapses the callback runs to
/// completion, so re-arming can never interrupt work the callback started.
pub struct DebounceTimer {
    delay: Duration,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    /// Create an idle timer with a fixed quiet period.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Mutex::new(None),
        }
    }

    /// Quiet period.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel any pending fire and schedule `callback` after the quiet period.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn arm<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        let previous = self.slot.lock().expect("mutex poisoned").replace(task);
        if let Some(prev) = previous {
            prev.abort();
        }
    }

    /// Cancel a pending fire, if any.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn cancel(&self) {
        if let Some(task) = self.slot.lock().expect("mutex poisoned").take() {
            task.abort();
        }
    }

    /// Whether a fire is scheduled and has not happened yet.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .expect("mutex poisoned")
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
    }
}
