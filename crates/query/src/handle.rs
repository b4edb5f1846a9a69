use {
    crate::{Lookup, QueryClient, QueryError, QueryKey, QueryOptions, QueryState},
    chain::{ChainContext, ChainId},
    futures::future::BoxFuture,
    std::sync::{
        Arc,
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    tokio::{sync::watch, task::JoinHandle},
};

/// Describes a query against one external service.
pub trait QuerySpec: Send + Sync + 'static {
    type Output: Clone + Default + Send + Sync + 'static;

    /// Logical name, the first component of the cache key.
    fn name(&self) -> &'static str;

    /// Name of the service used in error messages.
    fn service(&self) -> &'static str;

    /// Chains the service can be queried on.
    fn supported_chains(&self) -> Vec<ChainId>;

    /// Serialized parameters of the query, `None` if a required parameter is
    /// missing.
    fn params(&self) -> Option<Vec<String>>;

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
    }

    /// Performs the request on the given chain.
    fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Self::Output, QueryError>>;
}

/// The state of a single consumer of a query.
///
/// The key of the query is derived from the chain selected at the time of
/// each load. Responses that resolve after the selection changed or after a
/// newer load was started are not applied.
pub struct ChainScopedQuery<Q: QuerySpec> {
    spec: Arc<Q>,
    client: QueryClient,
    chain: ChainContext,
    state: watch::Sender<QueryState<Q::Output>>,
    active: Mutex<Option<Load>>,
    loads: AtomicU64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Load {
    key: QueryKey,
    id: u64,
}

#[derive(Clone, Copy)]
enum Mode {
    Cached,
    Refetch,
}

enum Gate {
    Idle,
    Unsupported(QueryError),
    Open(QueryKey),
}

impl<Q: QuerySpec> ChainScopedQuery<Q> {
    pub fn new(spec: Q, client: QueryClient, chain: ChainContext) -> Self {
        let (state, _) = watch::channel(QueryState::idle());
        Self {
            spec: Arc::new(spec),
            client,
            chain,
            state,
            active: Mutex::new(None),
            loads: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> QueryState<Q::Output> {
        self.state.borrow().clone()
    }

    /// Observe state transitions, including `loading`.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<Q::Output>> {
        self.state.subscribe()
    }

    /// The cache key for the current chain selection, `None` while the query
    /// is gated.
    pub fn key(&self) -> Option<QueryKey> {
        match self.gate(self.chain.current()) {
            Gate::Open(key) => Some(key),
            _ => None,
        }
    }

    /// Loads the query honoring the cache staleness.
    pub async fn load(&self) -> QueryState<Q::Output> {
        self.run(Mode::Cached).await
    }

    /// Requests a new value regardless of staleness. Gating still applies.
    pub async fn refetch(&self) -> QueryState<Q::Output> {
        self.run(Mode::Refetch).await
    }

    fn gate(&self, chain: ChainId) -> Gate {
        let options = self.spec.options();
        let params = match self.spec.params() {
            Some(params) if options.enabled => params,
            _ => return Gate::Idle,
        };
        let supported = self.spec.supported_chains();
        if !supported.contains(&chain) {
            return Gate::Unsupported(QueryError::UnsupportedChain {
                service: self.spec.service(),
                chain,
                supported,
            });
        }
        Gate::Open(QueryKey::new(self.spec.name(), chain).with_params(params))
    }

    /// Reloads the query every time the chain selection changes, for as long
    /// as the chain context lives. The selection is observed from the moment
    /// this is called.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let selection = self.chain.subscribe();
        tokio::task::spawn(async move { self.follow(selection).await })
    }

    async fn follow(&self, mut selection: watch::Receiver<ChainId>) {
        while selection.changed().await.is_ok() {
            let chain = *selection.borrow_and_update();
            tracing::debug!(query = self.spec.name(), %chain, "reloading query for new chain");
            self.load().await;
        }
    }

    async fn run(&self, mode: Mode) -> QueryState<Q::Output> {
        let key = match self.gate(self.chain.current()) {
            Gate::Idle => return self.settle(QueryState::idle()),
            Gate::Unsupported(err) => {
                tracing::debug!(%err, "query on unsupported chain");
                return self.settle(QueryState::failure(err, None));
            }
            Gate::Open(key) => key,
        };

        let (load, mut previous) = {
            let mut active = self.active.lock().unwrap();
            // Only data loaded for the very same key may be shown while
            // loading; anything else belongs to other parameters or chains.
            let previous = match active.as_ref() {
                Some(load) if load.key == key => self.state.borrow().data.clone(),
                _ => None,
            };
            let load = Load {
                key: key.clone(),
                id: self.loads.fetch_add(1, Ordering::Relaxed),
            };
            *active = Some(load.clone());
            (load, previous)
        };
        self.state.send_replace(QueryState::pending(previous.clone()));

        let options = self.spec.options();
        let fetcher = {
            let spec = self.spec.clone();
            let chain = key.chain();
            move || spec.fetch(chain)
        };
        let result = match mode {
            Mode::Cached => match self.client.lookup(key.clone(), &options, fetcher) {
                Lookup::Fresh(data) => Ok(data),
                Lookup::Stale {
                    value,
                    revalidation,
                } => {
                    // Show the stale value right away, the revalidated one
                    // replaces it below.
                    if !self.publish(&load, QueryState::pending(Some(value.clone()))) {
                        return self.state();
                    }
                    previous = Some(value);
                    revalidation.await
                }
                Lookup::Miss(request) => request.await,
            },
            Mode::Refetch => self.client.refetch(key.clone(), &options, fetcher).await,
        };

        let state = match result {
            Ok(data) => QueryState::success(data),
            Err(err) => {
                tracing::debug!(%key, %err, "query failed");
                QueryState::failure(err, previous)
            }
        };
        if self.publish(&load, state.clone()) {
            state
        } else {
            self.state()
        }
    }

    /// Publishes the state of a load unless the load was superseded by a
    /// newer one or by a chain switch. Returns whether it was published.
    fn publish(&self, load: &Load, state: QueryState<Q::Output>) -> bool {
        let active = self.active.lock().unwrap();
        if active.as_ref() != Some(load) || self.chain.current() != load.key.chain() {
            tracing::debug!(key = %load.key, "ignoring response of superseded query");
            return false;
        }
        self.state.send_replace(state);
        true
    }

    /// Applies a state that didn't require a request and forgets the active
    /// load so late responses of it are ignored.
    fn settle(&self, state: QueryState<Q::Output>) -> QueryState<Q::Output> {
        *self.active.lock().unwrap() = None;
        self.state.send_replace(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chain::Chain,
        futures::FutureExt,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
    };

    #[derive(Clone)]
    struct Items {
        owner: Option<&'static str>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
        /// Appends the number of the request to the response.
        versioned: bool,
    }

    impl Items {
        fn new(owner: Option<&'static str>) -> Self {
            Self {
                owner,
                calls: Default::default(),
                delay: Duration::ZERO,
                versioned: false,
            }
        }
    }

    impl QuerySpec for Items {
        type Output = Vec<u64>;

        fn name(&self) -> &'static str {
            "items"
        }

        fn service(&self) -> &'static str {
            "item service"
        }

        fn supported_chains(&self) -> Vec<ChainId> {
            vec![Chain::Ethereum.id(), Chain::Base.id()]
        }

        fn params(&self) -> Option<Vec<String>> {
            self.owner.map(|owner| vec![owner.to_string()])
        }

        fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Vec<u64>, QueryError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            let delay = self.delay;
            let versioned = self.versioned;
            async move {
                tokio::time::sleep(delay).await;
                Ok(if versioned {
                    vec![chain.get(), call]
                } else {
                    vec![chain.get()]
                })
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn missing_parameters_settle_idle_without_request() {
        let spec = Items::new(None);
        let calls = spec.calls.clone();
        let query =
            ChainScopedQuery::new(spec, QueryClient::new(), ChainContext::new(Chain::Ethereum));

        let state = query.load().await;
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(state.data, Some(vec![]));
        assert!(query.key().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_chain_fails_without_request() {
        let spec = Items::new(Some("alice"));
        let calls = spec.calls.clone();
        let query = ChainScopedQuery::new(
            spec,
            QueryClient::new(),
            ChainContext::new(Chain::HyperEvm),
        );

        let state = query.refetch().await;
        assert!(!state.loading);
        assert_eq!(
            state.error.unwrap().to_string(),
            "item service does not support chain 999, supported chains: 1, 8453"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chain_switch_does_not_serve_previous_chain() {
        let chain = ChainContext::new(Chain::Ethereum);
        let spec = Items::new(Some("alice"));
        let calls = spec.calls.clone();
        let query = ChainScopedQuery::new(spec, QueryClient::new(), chain.clone());

        assert_eq!(query.load().await.data, Some(vec![1]));

        chain.select(Chain::Base);
        let state = query.load().await;
        assert_eq!(state.data, Some(vec![8453]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Switching back is served from the cache of the first chain.
        chain.select(Chain::Ethereum);
        assert_eq!(query.load().await.data, Some(vec![1]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_state_keeps_data_of_same_key_only() {
        let chain = ChainContext::new(Chain::Ethereum);
        let mut spec = Items::new(Some("alice"));
        spec.delay = Duration::from_secs(5);
        let query = Arc::new(ChainScopedQuery::new(spec, QueryClient::new(), chain.clone()));
        query.load().await;

        let refetch = {
            let query = query.clone();
            tokio::spawn(async move { query.refetch().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        let pending = query.state();
        assert!(pending.loading);
        assert_eq!(pending.data, Some(vec![1]));
        refetch.await.unwrap();

        chain.select(Chain::Base);
        let load = {
            let query = query.clone();
            tokio::spawn(async move { query.load().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        let pending = query.state();
        assert!(pending.loading);
        assert_eq!(pending.data, None);
        assert_eq!(load.await.unwrap().data, Some(vec![8453]));
    }

    #[tokio::test(start_paused = true)]
    async fn response_resolving_after_chain_switch_is_ignored() {
        let chain = ChainContext::new(Chain::Ethereum);
        let mut spec = Items::new(Some("alice"));
        spec.delay = Duration::from_secs(5);
        let query = Arc::new(ChainScopedQuery::new(spec, QueryClient::new(), chain.clone()));

        let pending = {
            let query = query.clone();
            tokio::spawn(async move { query.load().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(query.state().loading);

        chain.select(Chain::Base);
        let state = pending.await.unwrap();
        assert!(state.loading);
        assert_eq!(state.data, None);
        assert_eq!(query.key().unwrap().chain(), Chain::Base.id());
    }

    #[tokio::test(start_paused = true)]
    async fn revalidated_data_replaces_stale_data() {
        let mut spec = Items::new(Some("alice"));
        spec.delay = Duration::from_secs(1);
        spec.versioned = true;
        let query = Arc::new(ChainScopedQuery::new(
            spec,
            QueryClient::new(),
            ChainContext::new(Chain::Ethereum),
        ));
        assert_eq!(query.load().await.data, Some(vec![1, 1]));
        tokio::time::advance(Duration::from_secs(31)).await;

        let mut states = query.subscribe();
        let load = {
            let query = query.clone();
            tokio::spawn(async move { query.load().await })
        };
        let stale = states.wait_for(|state| state.loading).await.unwrap().clone();
        assert_eq!(stale.data, Some(vec![1, 1]));

        let fresh = load.await.unwrap();
        assert!(!fresh.loading);
        assert_eq!(fresh.data, Some(vec![1, 2]));
        assert_eq!(query.state().data, Some(vec![1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_query_follows_chain_selection() {
        let chain = ChainContext::new(Chain::Ethereum);
        let mut spec = Items::new(Some("alice"));
        spec.delay = Duration::from_secs(5);
        let calls = spec.calls.clone();
        let query = Arc::new(ChainScopedQuery::new(spec, QueryClient::new(), chain.clone()));
        let follower = query.clone().spawn();
        let mut states = query.subscribe();

        let load = {
            let query = query.clone();
            tokio::spawn(async move { query.load().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        chain.select(Chain::Base);

        let settled = states
            .wait_for(|state| state.data == Some(vec![8453]))
            .await
            .unwrap()
            .clone();
        assert!(!settled.loading);
        assert!(settled.error.is_none());
        load.await.unwrap();
        assert_eq!(query.state().data, Some(vec![8453]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        chain.select(Chain::HyperEvm);
        let unsupported = states
            .wait_for(|state| state.error.is_some())
            .await
            .unwrap()
            .clone();
        assert!(!unsupported.loading);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        follower.abort();
    }

    #[tokio::test]
    async fn disabled_query_is_idle() {
        struct Disabled(Items);

        impl QuerySpec for Disabled {
            type Output = Vec<u64>;

            fn name(&self) -> &'static str {
                self.0.name()
            }

            fn service(&self) -> &'static str {
                self.0.service()
            }

            fn supported_chains(&self) -> Vec<ChainId> {
                self.0.supported_chains()
            }

            fn params(&self) -> Option<Vec<String>> {
                self.0.params()
            }

            fn options(&self) -> QueryOptions {
                QueryOptions {
                    enabled: false,
                    ..Default::default()
                }
            }

            fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Vec<u64>, QueryError>> {
                self.0.fetch(chain)
            }
        }

        let items = Items::new(Some("alice"));
        let calls = items.calls.clone();
        let query = ChainScopedQuery::new(
            Disabled(items),
            QueryClient::new(),
            ChainContext::new(Chain::Ethereum),
        );

        let state = query.load().await;
        assert_eq!(state.data, Some(vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
