//! The batching core: per-window key collection, deduplication, and
//! ordered result remapping.
//!
//! A [`BatchLoader`] owns one pending window at a time. The first `load`
//! of a window opens it and schedules dispatch for the end of the current
//! scheduling turn (or a configured delay), so every sibling `load` issued
//! synchronously within one resolution pass lands in the same window.
//! Dispatch combines the window's deduplicated keys into one call to the
//! [`BatchFn`]; loads arriving after dispatch has started open a new
//! window.
//!
//! Concurrent loads of an identical key before dispatch share one pending
//! slot: one dispatched key, one result, delivered to every waiter. A
//! failed dispatch is delivered identically to every waiter of that
//! window; other windows are unaffected.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::oneshot;
use tracing::{debug, error};

use trellis_query::{QueryError, QueryResult};

/// The function executed once per dispatched window.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    /// Fetch values for the window's deduplicated keys.
    ///
    /// Keys absent from the returned map resolve via [`miss`](Self::miss);
    /// the batch call must not fail because of an unmatched key.
    async fn load(&self, keys: &[K]) -> QueryResult<HashMap<K, V>>;

    /// The value delivered for a key the batch produced no result for.
    fn miss(&self, key: &K) -> V;
}

/// Tuning knobs for a [`BatchLoader`].
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Split a window's keys into chunks of at most this size, one batch
    /// call each. Unset means one call per window.
    pub max_batch_size: Option<usize>,
    /// Memoize resolved keys for the loader's lifetime, short-circuiting
    /// repeat loads across windows. Off by default.
    pub cache: bool,
    /// Explicit delay before dispatch instead of end-of-turn scheduling.
    pub dispatch_delay: Option<Duration>,
}

impl LoaderOptions {
    /// Default options: one call per window, no memoization, end-of-turn
    /// dispatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of keys per batch call.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Enable or disable per-key memoization.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Delay dispatch by a fixed duration.
    pub fn dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }
}

/// One collection window: keys in insertion order (deduplicated) and the
/// pending result slots, each fanning out to its waiters.
struct Window<K, V> {
    keys: Vec<K>,
    slots: HashMap<K, Vec<oneshot::Sender<QueryResult<V>>>>,
}

impl<K, V> Window<K, V> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

struct State<K, V> {
    window: Option<Window<K, V>>,
    cache: HashMap<K, V>,
}

struct Inner<K, V, F> {
    name: SmolStr,
    batch_fn: F,
    options: LoaderOptions,
    state: Mutex<State<K, V>>,
}

/// A request-scoped batching loader for one kind of lookup.
pub struct BatchLoader<K, V, F> {
    inner: Arc<Inner<K, V, F>>,
}

impl<K, V, F> Clone for BatchLoader<K, V, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, F> BatchLoader<K, V, F>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    F: BatchFn<K, V> + 'static,
{
    /// Create a loader. `name` labels the loader in logs and abandonment
    /// errors.
    pub fn new(name: impl Into<SmolStr>, batch_fn: F, options: LoaderOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                batch_fn,
                options,
                state: Mutex::new(State {
                    window: None,
                    cache: HashMap::new(),
                }),
            }),
        }
    }

    /// Load the value for one key, joining the currently collecting window
    /// (or opening one).
    pub async fn load(&self, key: K) -> QueryResult<V> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if self.inner.options.cache {
                if let Some(value) = state.cache.get(&key) {
                    return Ok(value.clone());
                }
            }
            let opened = state.window.is_none();
            let window = state.window.get_or_insert_with(Window::new);
            if !window.slots.contains_key(&key) {
                window.keys.push(key.clone());
            }
            window.slots.entry(key).or_default().push(tx);
            if opened {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    Inner::dispatch(inner).await;
                });
            }
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(QueryError::batch_abandoned(self.inner.name.clone())),
        }
    }

    /// Number of keys waiting in the currently collecting window.
    pub fn pending(&self) -> usize {
        self.inner
            .state
            .lock()
            .window
            .as_ref()
            .map_or(0, |window| window.keys.len())
    }
}

impl<K, V, F> Inner<K, V, F>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + 'static,
    F: BatchFn<K, V> + 'static,
{
    async fn dispatch(inner: Arc<Self>) {
        match inner.options.dispatch_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            // Defer to the end of the current scheduling turn so sibling
            // loads issued synchronously land in this window.
            None => tokio::task::yield_now().await,
        }

        // Taking the window moves it to the dispatching phase; loads from
        // here on collect into a fresh window.
        let window = inner.state.lock().window.take();
        let Some(Window { keys, mut slots }) = window else {
            return;
        };
        debug!(loader = %inner.name, keys = keys.len(), "dispatching batch window");

        let chunk_size = inner.options.max_batch_size.unwrap_or(keys.len()).max(1);
        for chunk in keys.chunks(chunk_size) {
            match inner.batch_fn.load(chunk).await {
                Ok(mut results) => {
                    for key in chunk {
                        let value = results
                            .remove(key)
                            .unwrap_or_else(|| inner.batch_fn.miss(key));
                        if inner.options.cache {
                            inner.state.lock().cache.insert(key.clone(), value.clone());
                        }
                        if let Some(waiters) = slots.remove(key) {
                            for tx in waiters {
                                let _ = tx.send(Ok(value.clone()));
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(loader = %inner.name, error = %err, "batch dispatch failed");
                    for key in chunk {
                        if let Some(waiters) = slots.remove(key) {
                            for tx in waiters {
                                let _ = tx.send(Err(err.clone()));
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Doubler {
        calls: AtomicUsize,
        batches: Mutex<Vec<Vec<i64>>>,
    }

    impl Doubler {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                batches: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BatchFn<i64, i64> for Arc<Doubler> {
        async fn load(&self, keys: &[i64]) -> QueryResult<HashMap<i64, i64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().push(keys.to_vec());
            Ok(keys.iter().map(|&k| (k, k * 2)).collect())
        }

        fn miss(&self, _key: &i64) -> i64 {
            -1
        }
    }

    struct Failing;

    #[async_trait]
    impl BatchFn<i64, i64> for Failing {
        async fn load(&self, _keys: &[i64]) -> QueryResult<HashMap<i64, i64>> {
            Err(QueryError::store("boom"))
        }

        fn miss(&self, _key: &i64) -> i64 {
            -1
        }
    }

    #[tokio::test]
    async fn test_sibling_loads_share_one_window() {
        let batch_fn = Arc::new(Doubler::new());
        let loader = BatchLoader::new("posts", batch_fn.clone(), LoaderOptions::new());

        let results = join_all([1, 2, 3].map(|k| loader.load(k))).await;
        assert_eq!(
            results.into_iter().collect::<QueryResult<Vec<_>>>().unwrap(),
            [2, 4, 6]
        );
        assert_eq!(batch_fn.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*batch_fn.batches.lock(), [vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_duplicate_keys_deduplicated() {
        let batch_fn = Arc::new(Doubler::new());
        let loader = BatchLoader::new("posts", batch_fn.clone(), LoaderOptions::new());

        let results = join_all([1, 2, 2, 3].map(|k| loader.load(k))).await;
        let values = results.into_iter().collect::<QueryResult<Vec<_>>>().unwrap();
        assert_eq!(values, [2, 4, 4, 6]);
        // One dispatched membership entry for the duplicated key.
        assert_eq!(*batch_fn.batches.lock(), [vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_loads_after_dispatch_open_new_window() {
        let batch_fn = Arc::new(Doubler::new());
        let loader = BatchLoader::new("posts", batch_fn.clone(), LoaderOptions::new());

        assert_eq!(loader.load(1).await.unwrap(), 2);
        assert_eq!(loader.load(1).await.unwrap(), 2);
        assert_eq!(batch_fn.calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.pending(), 0);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_repeat_loads() {
        let batch_fn = Arc::new(Doubler::new());
        let loader = BatchLoader::new(
            "posts",
            batch_fn.clone(),
            LoaderOptions::new().cache(true),
        );

        assert_eq!(loader.load(1).await.unwrap(), 2);
        assert_eq!(loader.load(1).await.unwrap(), 2);
        assert_eq!(batch_fn.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_batch_size_chunks_window() {
        let batch_fn = Arc::new(Doubler::new());
        let loader = BatchLoader::new(
            "posts",
            batch_fn.clone(),
            LoaderOptions::new().max_batch_size(2),
        );

        let results = join_all([1, 2, 3, 4, 5].map(|k| loader.load(k))).await;
        assert_eq!(
            results.into_iter().collect::<QueryResult<Vec<_>>>().unwrap(),
            [2, 4, 6, 8, 10]
        );
        assert_eq!(batch_fn.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *batch_fn.batches.lock(),
            [vec![1, 2], vec![3, 4], vec![5]]
        );
    }

    #[tokio::test]
    async fn test_missing_keys_resolve_via_miss() {
        struct Partial;

        #[async_trait]
        impl BatchFn<i64, i64> for Partial {
            async fn load(&self, keys: &[i64]) -> QueryResult<HashMap<i64, i64>> {
                Ok(keys
                    .iter()
                    .filter(|&&k| k != 2)
                    .map(|&k| (k, k * 2))
                    .collect())
            }

            fn miss(&self, _key: &i64) -> i64 {
                0
            }
        }

        let loader = BatchLoader::new("posts", Partial, LoaderOptions::new());
        let results = join_all([1, 2].map(|k| loader.load(k))).await;
        assert_eq!(
            results.into_iter().collect::<QueryResult<Vec<_>>>().unwrap(),
            [2, 0]
        );
    }

    #[tokio::test]
    async fn test_dispatch_failure_reaches_every_waiter() {
        let loader = BatchLoader::new("posts", Failing, LoaderOptions::new());
        let results = join_all([1, 2, 2].map(|k| loader.load(k))).await;
        for result in results {
            assert_eq!(result.unwrap_err(), QueryError::store("boom"));
        }
    }

    #[tokio::test]
    async fn test_failure_leaves_next_window_unaffected() {
        struct FailOnce {
            failed: AtomicUsize,
        }

        #[async_trait]
        impl BatchFn<i64, i64> for FailOnce {
            async fn load(&self, keys: &[i64]) -> QueryResult<HashMap<i64, i64>> {
                if self.failed.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(QueryError::store("first window fails"));
                }
                Ok(keys.iter().map(|&k| (k, k * 2)).collect())
            }

            fn miss(&self, _key: &i64) -> i64 {
                -1
            }
        }

        let loader = BatchLoader::new(
            "posts",
            FailOnce {
                failed: AtomicUsize::new(0),
            },
            LoaderOptions::new(),
        );
        assert!(loader.load(1).await.is_err());
        assert_eq!(loader.load(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_delay_widens_window() {
        let batch_fn = Arc::new(Doubler::new());
        let loader = BatchLoader::new(
            "posts",
            batch_fn.clone(),
            LoaderOptions::new().dispatch_delay(Duration::from_millis(20)),
        );

        let first = loader.load(1);
        let second = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            loader.load(2).await
        };
        let (a, b) = tokio::join!(first, second);
        assert_eq!((a.unwrap(), b.unwrap()), (2, 4));
        // The delayed window caught the late arrival.
        assert_eq!(batch_fn.calls.load(Ordering::SeqCst), 1);
    }
}
