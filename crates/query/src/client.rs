//! Process-wide query cache.
//!
//! The cache holds a bounded number of keys and evicts the least recently
//! used one when it is full. Its mutex is never held across an `.await`.
//! Every request takes a new generation number and a response is only
//! written to the cache if no response of a newer generation was written
//! before it. This makes out of order completions (a slow request finishing
//! after a forced refetch) deterministic instead of last-write-wins.

use {
    crate::{QueryError, QueryKey, RetryPolicy},
    anyhow::anyhow,
    futures::{FutureExt, future::BoxFuture},
    lru::LruCache,
    prometheus::IntCounterVec,
    request_sharing::{BoxRequestSharing, BoxShared},
    std::{
        any::Any,
        future::Future,
        num::NonZeroUsize,
        sync::{
            Arc,
            Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    },
    tokio::time::Instant,
};

type Value = Arc<dyn Any + Send + Sync>;

type Response = Result<Value, QueryError>;

/// Number of keys a [`QueryClient`] created with [`QueryClient::new`] holds.
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(1_000).unwrap();

/// Per query kind configuration.
#[derive(Clone, Copy, Debug)]
pub struct QueryOptions {
    /// Disabled queries never hit the network.
    pub enabled: bool,
    /// Cached values younger than this are returned without a request.
    pub stale_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: Duration::from_secs(30),
            retry: Default::default(),
        }
    }
}

impl QueryOptions {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Outcome of looking up a key in the cache.
pub enum Lookup<T> {
    /// The cached value is younger than the stale time.
    Fresh(T),
    /// The cached value is stale. `revalidation` resolves to its replacement
    /// and runs to completion even if it is dropped.
    Stale {
        value: T,
        revalidation: BoxFuture<'static, Result<T, QueryError>>,
    },
    /// Nothing is cached for the key.
    Miss(BoxFuture<'static, Result<T, QueryError>>),
}

/// Cache of query results shared by all consumers. Cloning is cheap and all
/// clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Mutex<LruCache<QueryKey, Entry>>,
    generations: AtomicU64,
    in_flight: BoxRequestSharing<QueryKey, Response>,
    metrics: &'static Metrics,
}

struct Entry {
    value: Value,
    updated_at: Instant,
    generation: u64,
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Query cache lookups by result (hit, stale, miss).
    #[metric(labels("query", "result"))]
    query_cache_lookups: IntCounterVec,

    /// Responses that were dropped because a newer response was cached first.
    #[metric(labels("query"))]
    query_cache_discarded_responses: IntCounterVec,

    /// Entries evicted to make room for other keys.
    #[metric(labels("query"))]
    query_cache_evictions: IntCounterVec,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a client caching at most `capacity` keys.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: Mutex::new(LruCache::new(capacity)),
                generations: AtomicU64::new(0),
                in_flight: BoxRequestSharing::labelled("query"),
                metrics: Metrics::instance(observe::metrics::get_storage_registry()).unwrap(),
            }),
        }
    }

    /// Looks the key up following the stale-while-revalidate policy:
    /// - fresh cached values are returned as is,
    /// - stale cached values are returned together with a background request
    ///   that refreshes the cache,
    /// - otherwise the caller gets the in-flight request for the key or a new
    ///   one.
    pub fn lookup<T, F, Fut>(
        &self,
        key: QueryKey,
        options: &QueryOptions,
        fetcher: F,
    ) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        match self.cached::<T>(&key) {
            Some((value, age)) if age < options.stale_time => {
                self.record(&key, "hit");
                tracing::trace!(%key, ?age, "query cache hit");
                Lookup::Fresh(value)
            }
            Some((value, age)) => {
                self.record(&key, "stale");
                tracing::debug!(%key, ?age, "revalidating stale query");
                let request = self.start(key.clone(), options.retry, fetcher, false);
                tokio::spawn(request.clone());
                Lookup::Stale {
                    value,
                    revalidation: resolve(key, request),
                }
            }
            None => {
                self.record(&key, "miss");
                tracing::debug!(%key, "query cache miss");
                let request = self.start(key.clone(), options.retry, fetcher, false);
                Lookup::Miss(resolve(key, request))
            }
        }
    }

    /// Returns the value for the key. Stale values are returned immediately
    /// while the cache is refreshed in the background.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: QueryKey,
        options: &QueryOptions,
        fetcher: F,
    ) -> Result<T, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        match self.lookup(key, options, fetcher) {
            Lookup::Fresh(value) | Lookup::Stale { value, .. } => Ok(value),
            Lookup::Miss(request) => request.await,
        }
    }

    /// Always requests a new value for the key, superseding a request that
    /// might already be in flight.
    pub async fn refetch<T, F, Fut>(
        &self,
        key: QueryKey,
        options: &QueryOptions,
        fetcher: F,
    ) -> Result<T, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        self.record(&key, "refetch");
        let request = self.start(key.clone(), options.retry, fetcher, true);
        resolve(key, request).await
    }

    /// Returns the cached value for the key regardless of its age.
    pub fn get<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        self.cached(key).map(|(value, _)| value)
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.inner.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cached<T: Clone + 'static>(&self, key: &QueryKey) -> Option<(T, Duration)> {
        let mut cache = self.inner.cache.lock().unwrap();
        let entry = cache.get(key)?;
        let value = entry.value.downcast_ref::<T>()?.clone();
        Some((value, entry.updated_at.elapsed()))
    }

    fn start<T, F, Fut>(
        &self,
        key: QueryKey,
        retry: RetryPolicy,
        fetcher: F,
        replace: bool,
    ) -> BoxShared<Response>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        let request = |key: &QueryKey| {
            let inner = self.inner.clone();
            let key = key.clone();
            let generation = inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
            async move {
                let label = key.to_string();
                let value = retry.run(&label, &fetcher).await?;
                let value: Value = Arc::new(value);
                inner.store(&key, generation, value.clone());
                Ok::<Value, QueryError>(value)
            }
            .boxed()
        };
        if replace {
            self.inner.in_flight.replace(key, request)
        } else {
            self.inner.in_flight.shared_or_else(key, request)
        }
    }

    fn record(&self, key: &QueryKey, result: &str) {
        self.inner
            .metrics
            .query_cache_lookups
            .with_label_values(&[key.name(), result])
            .inc();
    }
}

impl Inner {
    fn store(&self, key: &QueryKey, generation: u64, value: Value) {
        let mut cache = self.cache.lock().unwrap();
        if cache
            .peek(key)
            .is_some_and(|entry| entry.generation > generation)
        {
            tracing::debug!(%key, generation, "discarding superseded query response");
            self.metrics
                .query_cache_discarded_responses
                .with_label_values(&[key.name()])
                .inc();
            return;
        }
        let entry = Entry {
            value,
            updated_at: Instant::now(),
            generation,
        };
        match cache.push(key.clone(), entry) {
            Some((evicted, _)) if evicted != *key => {
                tracing::trace!(key = %evicted, "evicted query");
                self.metrics
                    .query_cache_evictions
                    .with_label_values(&[evicted.name()])
                    .inc();
            }
            _ => (),
        }
    }
}

fn resolve<T: Clone + Send + 'static>(
    key: QueryKey,
    request: BoxShared<Response>,
) -> BoxFuture<'static, Result<T, QueryError>> {
    async move { downcast(&key, request.await?) }.boxed()
}

fn downcast<T: Clone + 'static>(key: &QueryKey, value: Value) -> Result<T, QueryError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| QueryError::service(anyhow!("query {key} is cached with a different type")))
}
