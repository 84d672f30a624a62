use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::{
    channel::{mpsc, oneshot},
    future::{AbortHandle, Abortable, Aborted},
};
use parking_lot::Mutex;

use crate::{api::Time, QueryKey};

/// What an optimistic mutation needs from the cache it writes to
#[async_trait]
pub trait QueryCache<V>: Send + Sync {
    /// Cancels every fetch currently running for `key`, and resolves once none
    /// of them can write to the cache anymore
    async fn cancel_in_flight(&self, key: &QueryKey);

    fn get(&self, key: &QueryKey) -> Option<V>;

    /// Replaces the value with the result of `updater`, unless it returns
    /// `None` in which case the entry is left as-is
    ///
    /// `updater` must not call back into the cache.
    fn set<F>(&self, key: &QueryKey, updater: F)
    where
        F: FnOnce(Option<&V>) -> Option<V>;

    /// Puts back exactly `value`, removing the entry if it is `None`
    fn restore(&self, key: &QueryKey, value: Option<V>);

    /// Marks the entry as stale
    fn invalidate(&self, key: &QueryKey);
}

#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    /// How long a written entry stays fresh, `None` meaning until invalidated
    pub stale_time: Option<Duration>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchStatus {
    Applied,

    /// The fetch was cancelled before it could write its result
    Cancelled,
}

struct Entry<V> {
    data: V,
    updated_at: Time,
    invalidated: bool,
}

struct InFlight {
    id: u64,
    abort: AbortHandle,

    /// Resolves (with an error) once the fetch future is gone
    done: oneshot::Receiver<()>,
}

struct State<V> {
    entries: HashMap<QueryKey, Entry<V>>,
    in_flight: HashMap<QueryKey, Vec<InFlight>>,
    subscribers: HashMap<QueryKey, Vec<mpsc::UnboundedSender<Option<V>>>>,
    next_fetch_id: u64,
}

impl<V: Clone> State<V> {
    fn write(&mut self, key: &QueryKey, data: V) {
        self.relay(key, Some(&data));
        self.entries.insert(
            key.clone(),
            Entry {
                data,
                updated_at: Utc::now(),
                invalidated: false,
            },
        );
    }

    fn remove(&mut self, key: &QueryKey) {
        if self.entries.remove(key).is_some() {
            self.relay(key, None);
        }
    }

    fn relay(&mut self, key: &QueryKey, data: Option<&V>) {
        if let Some(subs) = self.subscribers.get_mut(key) {
            subs.retain(|s| s.unbounded_send(data.cloned()).is_ok());
        }
    }
}

impl<V> State<V> {
    /// Returns whether fetch `id` was still registered, ie. not cancelled
    fn unregister(&mut self, key: &QueryKey, id: u64) -> bool {
        let fetches = match self.in_flight.get_mut(key) {
            None => return false,
            Some(f) => f,
        };
        let len_before = fetches.len();
        fetches.retain(|f| f.id != id);
        let found = fetches.len() != len_before;
        if fetches.is_empty() {
            self.in_flight.remove(key);
        }
        found
    }
}

/// Unregisters its fetch and acknowledges cancellation when dropped, whether
/// the fetch completed, failed, was aborted or was dropped mid-way
struct FetchGuard<V> {
    state: Arc<Mutex<State<V>>>,
    key: QueryKey,
    id: u64,
    _done: oneshot::Sender<()>,
}

impl<V> Drop for FetchGuard<V> {
    fn drop(&mut self) {
        self.state.lock().unregister(&self.key, self.id);
    }
}

/// In-process query cache, shared by cloning
pub struct MemoryCache<V> {
    state: Arc<Mutex<State<V>>>,
    config: Arc<CacheConfig>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        MemoryCache {
            state: self.state.clone(),
            config: self.config.clone(),
        }
    }
}

impl<V: Clone + Send + 'static> MemoryCache<V> {
    pub fn new(config: CacheConfig) -> MemoryCache<V> {
        MemoryCache {
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                subscribers: HashMap::new(),
                next_fetch_id: 0,
            })),
            config: Arc::new(config),
        }
    }

    /// Runs `fetcher` as an in-flight fetch for `key`, then stores
    /// `apply(current, result)` unless the fetch got cancelled meanwhile
    ///
    /// Errors are returned as-is and leave the entry untouched.
    pub async fn fetch<T, E, Fut, A>(
        &self,
        key: &QueryKey,
        fetcher: Fut,
        apply: A,
    ) -> Result<FetchStatus, E>
    where
        Fut: Future<Output = Result<T, E>>,
        A: FnOnce(Option<&V>, T) -> V,
    {
        let (abort, registration) = AbortHandle::new_pair();
        let (done_sender, done) = oneshot::channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_fetch_id;
            state.next_fetch_id += 1;
            state
                .in_flight
                .entry(key.clone())
                .or_insert_with(Vec::new)
                .push(InFlight { id, abort, done });
            id
        };
        tracing::trace!(%key, id, "starting fetch");
        let _guard = FetchGuard {
            state: self.state.clone(),
            key: key.clone(),
            id,
            _done: done_sender,
        };

        let res = match Abortable::new(fetcher, registration).await {
            Err(Aborted) => {
                tracing::debug!(%key, id, "fetch cancelled while running");
                return Ok(FetchStatus::Cancelled);
            }
            Ok(res) => res?,
        };

        let mut state = self.state.lock();
        if !state.unregister(key, id) {
            tracing::debug!(%key, id, "fetch cancelled after completion, dropping its result");
            return Ok(FetchStatus::Cancelled);
        }
        let data = apply(state.entries.get(key).map(|e| &e.data), res);
        state.write(key, data);
        tracing::trace!(%key, id, "fetch applied");
        Ok(FetchStatus::Applied)
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.state
            .lock()
            .in_flight
            .get(key)
            .map_or(false, |f| !f.is_empty())
    }

    pub fn remove(&self, key: &QueryKey) {
        self.state.lock().remove(key);
    }

    /// Marks stale every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &QueryKey) {
        let mut state = self.state.lock();
        for (key, e) in state.entries.iter_mut() {
            if key.starts_with(prefix) {
                tracing::debug!(%key, "invalidating");
                e.invalidated = true;
            }
        }
    }

    /// Missing entries are always stale
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let state = self.state.lock();
        match state.entries.get(key) {
            None => true,
            Some(e) if e.invalidated => true,
            Some(e) => self
                .config
                .stale_time
                .map_or(false, |stale_time| Utc::now() - e.updated_at >= stale_time),
        }
    }

    /// Receives the new value of `key` on every write, `None` on removal
    pub fn subscribe(&self, key: &QueryKey) -> mpsc::UnboundedReceiver<Option<V>> {
        let (sender, receiver) = mpsc::unbounded();
        self.state
            .lock()
            .subscribers
            .entry(key.clone())
            .or_insert_with(Vec::new)
            .push(sender);
        receiver
    }
}

#[async_trait]
impl<V: Clone + Send + 'static> QueryCache<V> for MemoryCache<V> {
    async fn cancel_in_flight(&self, key: &QueryKey) {
        let fetches = self
            .state
            .lock()
            .in_flight
            .remove(key)
            .unwrap_or_default();
        if !fetches.is_empty() {
            tracing::debug!(%key, num_fetches = fetches.len(), "cancelling in-flight fetches");
        }
        for f in fetches {
            f.abort.abort();
            // the sender never sends, this returns when the fetch is dropped
            let _ = f.done.await;
        }
    }

    fn get(&self, key: &QueryKey) -> Option<V> {
        self.state.lock().entries.get(key).map(|e| e.data.clone())
    }

    fn set<F>(&self, key: &QueryKey, updater: F)
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let mut state = self.state.lock();
        if let Some(data) = updater(state.entries.get(key).map(|e| &e.data)) {
            tracing::trace!(%key, "writing entry");
            state.write(key, data);
        }
    }

    fn restore(&self, key: &QueryKey, value: Option<V>) {
        let mut state = self.state.lock();
        match value {
            Some(data) => state.write(key, data),
            None => state.remove(key),
        }
    }

    fn invalidate(&self, key: &QueryKey) {
        if let Some(e) = self.state.lock().entries.get_mut(key) {
            e.invalidated = true;
        }
    }
}
