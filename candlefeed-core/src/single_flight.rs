use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};

type SharedCall<V> = Shared<BoxFuture<'static, Option<V>>>;

struct Call<V> {
    id: u64,
    shared: SharedCall<V>,
    abort: AbortHandle,
}

struct Calls<K, V> {
    next_id: u64,
    by_key: HashMap<K, Call<V>>,
}

/// Collapses concurrent calls with the same key into one underlying future.
///
/// The first caller for a key installs the future; later callers await a
/// shared clone of it. The entry is removed once the call completes, so a
/// subsequent call with the same key starts fresh. `cancel_all` aborts every
/// in-flight call; awaiting callers then observe `None`.
pub struct SingleFlight<K, V> {
    calls: Mutex<Calls<K, V>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty single-flight map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Calls {
                next_id: 0,
                by_key: HashMap::new(),
            }),
        }
    }

    /// Run `fut` under `key`, or join the call already in flight for `key`.
    ///
    /// Returns `None` if the call was cancelled through [`cancel_all`](Self::cancel_all).
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub async fn run<F>(&self, key: K, fut: F) -> Option<V>
    where
        F: Future<Output = V> + Send + 'static,
    {
        let (id, shared) = {
            let mut calls = self.calls.lock().expect("mutex poisoned");
            if let Some(existing) = calls.by_key.get(&key) {
                (existing.id, existing.shared.clone())
            } else {
                let (abort, registration) = AbortHandle::new_pair();
                let shared = Abortable::new(fut, registration)
                    .map(Result::ok)
                    .boxed()
                    .shared();
                let id = calls.next_id;
                calls.next_id = calls.next_id.wrapping_add(1);
                calls.by_key.insert(
                    key.clone(),
                    Call {
                        id,
                        shared: shared.clone(),
                        abort,
                    },
                );
                (id, shared)
            }
        };

        let out = shared.await;

        let mut calls = self.calls.lock().expect("mutex poisoned");
        if calls.by_key.get(&key).is_some_and(|c| c.id == id) {
            calls.by_key.remove(&key);
        }
        out
    }

    /// Abort every in-flight call and clear the map.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn cancel_all(&self) {
        let drained: Vec<Call<V>> = {
            let mut calls = self.calls.lock().expect("mutex poisoned");
            calls.by_key.drain().map(|(_, c)| c).collect()
        };
        for call in drained {
            call.abort.abort();
        }
    }

    /// Whether a call for `key` is currently in flight.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.calls
            .lock()
            .expect("mutex poisoned")
            .by_key
            .contains_key(key)
    }

    /// Number of calls currently in flight.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().expect("mutex poisoned").by_key.len()
    }
}
