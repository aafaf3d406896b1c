//! Deduplicating, batching point-lookup cache.
//!
//! A [`Loader`] sits in front of a [`BatchFn`] and makes sure that, for its whole
//! lifetime, a key is fetched at most once while its entry is cached, and that lookups
//! issued close together are grouped into a single batch call.
//!
//! # Batch windows
//!
//! The first `load` of a key that is not cached opens a window. It yields to the executor
//! [`LoaderConfig::yield_count`] times, which lets every other pending lookup on the same
//! task (a `join_all` over many loads, say) or on other ready tasks register its key.
//! The window is then closed and its keys are handed to the batch function, split into
//! chunks of [`LoaderConfig::max_batch_size`] when one is set. Lookups made after a window
//! closed open a new one.
//!
//! # Example
//!
//! ```ignore
//! let loader = Loader::new(batch_fn, LoaderConfig::default());
//!
//! // One batch call for both keys, a single fetch for "a".
//! let (a, b, again) = futures::join!(loader.load("a"), loader.load("b"), loader.load("a"));
//!
//! loader.clear(&"a".into());
//! ```

use async_trait::async_trait;
use futures::{
    channel::oneshot,
    future::{self, BoxFuture, FutureExt, Shared, join_all},
};
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    future::Future,
    hash::Hash,
    pin::Pin,
    sync::{Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};
use tracing::{debug, trace};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Fetches the values for a batch of keys.
///
/// Results are reported per key so that one failing key does not fail its siblings. A key
/// absent from the returned map is reported to its caller as a backend error.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    async fn load(&self, keys: &[K]) -> HashMap<K, DocumentStoreResult<V>>;
}

/// Tuning knobs for a [`Loader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Number of times the caller opening a window yields before dispatching it.
    pub yield_count: usize,
    /// Largest number of keys passed to one batch call. `None` means unbounded.
    pub max_batch_size: Option<usize>,
}

impl LoaderConfig {
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { yield_count: 10, max_batch_size: None }
    }
}

/// Builder for [`LoaderConfig`]. Unset values fall back to the defaults.
#[derive(Debug, Default)]
pub struct LoaderConfigBuilder {
    yield_count: Option<usize>,
    max_batch_size: Option<usize>,
}

impl LoaderConfigBuilder {
    pub fn with_yield_count(mut self, yield_count: usize) -> Self {
        self.yield_count = Some(yield_count);
        self
    }

    /// Caps the size of a single batch call. Zero is treated as unbounded.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size).filter(|size| *size > 0);
        self
    }

    pub fn build(self) -> LoaderConfig {
        let defaults = LoaderConfig::default();

        LoaderConfig {
            yield_count: self.yield_count.unwrap_or(defaults.yield_count),
            max_batch_size: self.max_batch_size.or(defaults.max_batch_size),
        }
    }
}

type SharedLoad<V> = Shared<BoxFuture<'static, DocumentStoreResult<V>>>;

struct Entry<V> {
    generation: u64,
    load: SharedLoad<V>,
}

struct Waiting<K, V> {
    key: K,
    generation: u64,
    sender: oneshot::Sender<DocumentStoreResult<V>>,
}

struct LoaderState<K, V> {
    cache: HashMap<K, Entry<V>>,
    pending: Vec<Waiting<K, V>>,
    next_generation: u64,
}

impl<K: Eq + Hash, V> LoaderState<K, V> {
    fn generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Drops the cache entry for `key` if it still belongs to `generation`.
    fn evict(&mut self, key: &K, generation: u64) {
        if self
            .cache
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            self.cache.remove(key);
        }
    }
}

/// Request-scoped deduplicating loader.
///
/// The cache is never expired automatically; entries leave it through [`Loader::clear`],
/// [`Loader::clear_all`], or when their lookup fails.
pub struct Loader<K, V, F> {
    batch_fn: F,
    config: LoaderConfig,
    state: Mutex<LoaderState<K, V>>,
}

impl<K, V, F> Loader<K, V, F>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: BatchFn<K, V>,
{
    pub fn new(batch_fn: F, config: LoaderConfig) -> Self {
        Self {
            batch_fn,
            config,
            state: Mutex::new(LoaderState {
                cache: HashMap::new(),
                pending: Vec::new(),
                next_generation: 0,
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState<K, V>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the value for `key`.
    ///
    /// Concurrent calls for the same key share one fetch. A cached value is returned
    /// without calling the batch function.
    pub async fn load(&self, key: K) -> DocumentStoreResult<V> {
        let (load, opens_window) = {
            let mut state = self.lock();

            match state.cache.get(&key) {
                Some(entry) => {
                    trace!(%key, "loader cache hit");
                    (entry.load.clone(), false)
                }
                None => {
                    let generation = state.generation();
                    let (sender, receiver) = oneshot::channel();
                    let label = key.to_string();
                    let load = receiver
                        .map(move |result| {
                            result.unwrap_or_else(|_| Err(DocumentStoreError::LoadCanceled(label)))
                        })
                        .boxed()
                        .shared();

                    state.cache.insert(key.clone(), Entry { generation, load: load.clone() });

                    let opens_window = state.pending.is_empty();
                    state.pending.push(Waiting { key, generation, sender });

                    (load, opens_window)
                }
            }
        };

        if opens_window {
            self.dispatch().await;
        }

        load.await
    }

    /// Loads several keys. Results come back in input order and fail independently.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = K>) -> Vec<DocumentStoreResult<V>> {
        join_all(
            keys.into_iter()
                .map(|key| self.load(key)),
        )
        .await
    }

    /// Seeds the cache with an already known value.
    ///
    /// Returns `false` and leaves the cache unchanged if `key` is already cached, pending
    /// or resolved. Clear the key first to overwrite it.
    pub fn prime(&self, key: K, value: V) -> bool {
        let mut state = self.lock();

        if state.cache.contains_key(&key) {
            return false;
        }

        let generation = state.generation();
        let load = future::ready(Ok(value))
            .boxed()
            .shared();

        state.cache.insert(key, Entry { generation, load });

        true
    }

    /// Evicts the entry for `key`. Returns `true` if one was cached.
    ///
    /// Callers already waiting on a pending lookup still receive its result; the next
    /// `load` fetches again.
    pub fn clear(&self, key: &K) -> bool {
        self.lock()
            .cache
            .remove(key)
            .is_some()
    }

    /// Evicts every entry.
    pub fn clear_all(&self) {
        self.lock().cache.clear();
    }

    /// Returns `true` if `key` has a cached entry, pending or resolved.
    pub fn contains(&self, key: &K) -> bool {
        self.lock().cache.contains_key(key)
    }

    async fn dispatch(&self) {
        let mut window = Window { state: &self.state, open: true, taken: Vec::new() };

        for _ in 0..self.config.yield_count {
            YieldNow::default().await;
        }

        window.close();

        if window.taken.is_empty() {
            return;
        }

        let mut seen = HashSet::new();
        let keys = window
            .taken
            .iter()
            .filter(|waiting| seen.insert(waiting.key.clone()))
            .map(|waiting| waiting.key.clone())
            .collect::<Vec<_>>();
        let chunk_size = self
            .config
            .max_batch_size
            .unwrap_or(keys.len())
            .max(1);

        debug!(keys = keys.len(), chunk_size, "dispatching loader batch");

        let mut results = HashMap::with_capacity(keys.len());
        for chunk in join_all(
            keys.chunks(chunk_size)
                .map(|chunk| self.batch_fn.load(chunk)),
        )
        .await
        {
            results.extend(chunk);
        }

        let taken = std::mem::take(&mut window.taken);
        let mut state = self.lock();

        for Waiting { key, generation, sender } in taken {
            let result = results
                .get(&key)
                .cloned()
                .unwrap_or_else(|| {
                    Err(DocumentStoreError::Backend(format!(
                        "batch function returned no result for {key}"
                    )))
                });

            if result.is_err() {
                state.evict(&key, generation);
            }

            // The receiver is gone only if every waiter was dropped.
            let _ = sender.send(result);
        }
    }
}

/// Tracks the lookups of one batch window until they are resolved.
///
/// Dropping it early (the caller that opened the window was cancelled) evicts the cache
/// entries it is responsible for, and dropping their senders wakes every waiter with
/// [`DocumentStoreError::LoadCanceled`].
struct Window<'a, K: Eq + Hash, V> {
    state: &'a Mutex<LoaderState<K, V>>,
    open: bool,
    taken: Vec<Waiting<K, V>>,
}

impl<K: Eq + Hash, V> Window<'_, K, V> {
    fn close(&mut self) {
        let state = self.state;
        let mut state = state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.taken = std::mem::take(&mut state.pending);
        self.open = false;
    }
}

impl<K: Eq + Hash, V> Drop for Window<'_, K, V> {
    fn drop(&mut self) {
        if !self.open && self.taken.is_empty() {
            return;
        }

        let state = self.state;
        let mut state = state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.open {
            let pending = std::mem::take(&mut state.pending);
            self.taken.extend(pending);
        }

        for waiting in self.taken.drain(..) {
            state.evict(&waiting.key, waiting.generation);
        }
    }
}

#[derive(Default)]
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }

        self.yielded = true;
        cx.waker().wake_by_ref();

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::StoreLocalId;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Vec<String>> {
            let mut calls = self.calls.lock().unwrap().clone();
            for call in &mut calls {
                call.sort();
            }
            calls
        }
    }

    #[async_trait]
    impl BatchFn<StoreLocalId, String> for Recorder {
        async fn load(
            &self,
            keys: &[StoreLocalId],
        ) -> HashMap<StoreLocalId, DocumentStoreResult<String>> {
            self.calls
                .lock()
                .unwrap()
                .push(keys.iter().map(|key| key.to_string()).collect());

            keys.iter()
                .map(|key| {
                    let result = if key.as_str().starts_with("missing") {
                        Err(DocumentStoreError::DocumentNotFound(key.to_string(), "test".into()))
                    } else {
                        Ok(format!("value-{key}"))
                    };
                    (key.clone(), result)
                })
                .collect()
        }
    }

    fn loader(recorder: &Recorder) -> Loader<StoreLocalId, String, Recorder> {
        Loader::new(recorder.clone(), LoaderConfig::default())
    }

    fn id(value: &str) -> StoreLocalId {
        StoreLocalId::from(value)
    }

    #[tokio::test]
    async fn concurrent_loads_of_one_key_share_a_fetch() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        let (a, b, c) = futures::join!(loader.load(id("a")), loader.load(id("a")), loader.load(id("a")));

        assert_eq!(a.unwrap(), "value-a");
        assert_eq!(b.unwrap(), "value-a");
        assert_eq!(c.unwrap(), "value-a");
        assert_eq!(recorder.calls(), vec![vec!["a".to_string()]]);
    }

    #[tokio::test]
    async fn loads_in_one_window_are_batched() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        let results = loader
            .load_many(vec![id("c"), id("a"), id("b"), id("a")])
            .await
            .into_iter()
            .collect::<DocumentStoreResult<Vec<_>>>()
            .unwrap();

        assert_eq!(results, vec!["value-c", "value-a", "value-b", "value-a"]);
        assert_eq!(
            recorder.calls(),
            vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]],
        );
    }

    #[tokio::test]
    async fn sequential_loads_use_the_cache() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        loader.load(id("a")).await.unwrap();
        loader.load(id("a")).await.unwrap();
        loader.load(id("b")).await.unwrap();

        assert_eq!(recorder.calls().len(), 2);
    }

    #[tokio::test]
    async fn primed_keys_skip_the_batch_function() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        assert!(loader.prime(id("a"), "primed".to_string()));
        assert!(!loader.prime(id("a"), "ignored".to_string()));

        assert_eq!(loader.load(id("a")).await.unwrap(), "primed");
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn clear_forces_a_fresh_fetch() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        loader.prime(id("a"), "stale".to_string());
        assert!(loader.clear(&id("a")));
        assert!(!loader.contains(&id("a")));

        assert_eq!(loader.load(id("a")).await.unwrap(), "value-a");
        assert_eq!(recorder.calls(), vec![vec!["a".to_string()]]);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_not_cached() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        let results = loader
            .load_many(vec![id("a"), id("missing-1")])
            .await;

        assert_eq!(results[0].as_ref().unwrap(), "value-a");
        assert!(results[1].as_ref().unwrap_err().is_not_found());
        assert!(loader.contains(&id("a")));
        assert!(!loader.contains(&id("missing-1")));

        let _ = loader.load(id("missing-1")).await;
        assert_eq!(recorder.calls().len(), 2);
    }

    #[tokio::test]
    async fn max_batch_size_splits_a_window() {
        let recorder = Recorder::default();
        let loader = Loader::new(
            recorder.clone(),
            LoaderConfig::builder()
                .with_max_batch_size(2)
                .build(),
        );

        let results = loader
            .load_many(["a", "b", "c", "d", "e"].map(id))
            .await;

        assert!(results.iter().all(Result::is_ok));

        let mut sizes = recorder
            .calls()
            .iter()
            .map(Vec::len)
            .collect::<Vec<_>>();
        sizes.sort();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn dropping_the_window_owner_cancels_waiters() {
        let recorder = Recorder::default();
        let loader = loader(&recorder);

        let mut owner = Box::pin(loader.load(id("a")));
        assert!(futures::poll!(owner.as_mut()).is_pending());

        let mut waiter = Box::pin(loader.load(id("a")));
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        drop(owner);

        assert!(matches!(waiter.await, Err(DocumentStoreError::LoadCanceled(_))));
        assert!(!loader.contains(&id("a")));
        assert!(recorder.calls().is_empty());
    }
}
