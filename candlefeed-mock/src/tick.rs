use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};

use candlefeed_core::{FeedError, StreamHandle, Tick, TickEvent, TickSource, TickStatus};

/// Instruction for how `subscribe` behaves.
#[derive(Debug, Clone, Default)]
pub enum TickBehavior {
    /// Open a stream fed by [`TickController::push`].
    #[default]
    Manual,
    /// Fail the `subscribe` call.
    Fail(FeedError),
    /// Hang the `subscribe` call.
    Hang,
}

#[derive(Default)]
struct TickState {
    behavior: TickBehavior,
    subscriptions: Vec<String>,
    manual_tx: Option<mpsc::Sender<TickEvent>>,
    kill_switch: Option<oneshot::Sender<()>>,
}

/// Controller handle used by tests to push events into a [`ManualTickSource`].
#[derive(Clone)]
pub struct TickController {
    state: Arc<Mutex<TickState>>,
}

impl TickController {
    /// Set how the next `subscribe` call behaves.
    pub async fn set_behavior(&self, behavior: TickBehavior) {
        self.state.lock().await.behavior = behavior;
    }

    /// Push an event into the active stream.
    ///
    /// Returns `true` if the event was queued, `false` if no stream is active
    /// or the channel is closed.
    pub async fn push(&self, event: TickEvent) -> bool {
        // Extract a sender clone without holding the lock across await
        let tx = self.state.lock().await.manual_tx.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Push a price tick.
    pub async fn push_tick(&self, tick: Tick) -> bool {
        self.push(TickEvent::Price(tick)).await
    }

    /// Push a status change.
    pub async fn push_status(&self, status: TickStatus) -> bool {
        self.push(TickEvent::Status(status)).await
    }

    /// Remotely end the active stream.
    pub async fn kill(&self) {
        let mut guard = self.state.lock().await;
        guard.manual_tx = None;
        if let Some(tx) = guard.kill_switch.take() {
            let _ = tx.send(());
        }
    }

    /// Symbols passed to `subscribe`, in call order.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.state.lock().await.subscriptions.clone()
    }

    /// Whether a stream is currently accepting pushes.
    pub async fn is_active(&self) -> bool {
        self.state
            .lock()
            .await
            .manual_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

/// A `TickSource` driven entirely by a [`TickController`].
pub struct ManualTickSource {
    name: &'static str,
    state: Arc<Mutex<TickState>>,
}

impl ManualTickSource {
    /// Create a tick source and its controller.
    #[must_use]
    pub fn new_with_controller(name: &'static str) -> (Arc<dyn TickSource>, TickController) {
        let state = Arc::new(Mutex::new(TickState::default()));
        let controller = TickController {
            state: Arc::clone(&state),
        };
        let me = Arc::new(Self { name, state });
        (me as Arc<dyn TickSource>, controller)
    }
}

#[async_trait]
impl TickSource for ManualTickSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn subscribe(
        &self,
        symbol: &str,
    ) -> Result<(StreamHandle, mpsc::Receiver<TickEvent>), FeedError> {
        let behavior = {
            let mut guard = self.state.lock().await;
            guard.subscriptions.push(symbol.to_string());
            guard.behavior.clone()
        };

        match behavior {
            TickBehavior::Fail(e) => Err(e),
            TickBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            TickBehavior::Manual => {
                let (tx, rx) = mpsc::channel::<TickEvent>(1024);
                let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
                let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
                let (in_tx, mut in_rx) = mpsc::channel::<TickEvent>(1024);

                {
                    let mut guard = self.state.lock().await;
                    guard.kill_switch = Some(kill_tx);
                    guard.manual_tx = Some(in_tx);
                }

                let join = tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut stop_rx => break,
                            _ = &mut kill_rx => break,
                            maybe = in_rx.recv() => {
                                let Some(event) = maybe else { break };
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });

                Ok((StreamHandle::new(join, stop_tx), rx))
            }
        }
    }
}
