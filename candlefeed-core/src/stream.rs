use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Owning handle for a running tick stream task.
///
/// `stop()` asks the pump to exit and waits for it. Dropping the handle (or
/// calling `abort()`) signals stop and then cancels the task outright, so a
/// source that ignores the signal cannot outlive its feed.
#[derive(Debug)]
pub struct StreamHandle {
    task: Option<JoinHandle<()>>,
    stop: Option<oneshot::Sender<()>>,
}

impl StreamHandle {
    /// Wrap a spawned stream task and its stop channel.
    #[must_use]
    pub const fn new(task: JoinHandle<()>, stop: oneshot::Sender<()>) -> Self {
        Self {
            task: Some(task),
            stop: Some(stop),
        }
    }

    /// Whether the stream task has already exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Abort the task immediately without waiting.
    pub fn abort(mut self) {
        self.cancel();
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            // receiver gone means the task already exited
            let _ = tx.send(());
        }
    }

    fn cancel(&mut self) {
        self.signal_stop();
        if let Some(task) = self.task.take()
            && !task.is_finished()
        {
            task.abort();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
