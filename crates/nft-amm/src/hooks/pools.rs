//! Queries against the pool subgraph.

use {
    super::address_param,
    alloy_primitives::Address,
    chain::ChainId,
    futures::{FutureExt, future::BoxFuture},
    query::{QueryError, QueryOptions, QuerySpec},
    std::{sync::Arc, time::Duration},
    subgraph::{Currency, Pool, SubgraphError, SubgraphService},
};

const SERVICE: &str = "subgraph";

fn query_error(err: SubgraphError) -> QueryError {
    match err {
        SubgraphError::UnsupportedChain { chain, supported } => QueryError::UnsupportedChain {
            service: SERVICE,
            chain,
            supported,
        },
        SubgraphError::Query(err) => QueryError::service(err),
    }
}

/// Every pool of the selected chain.
pub struct AllPairs {
    pub(super) subgraph: Arc<dyn SubgraphService>,
    pub(super) enabled: bool,
}

impl QuerySpec for AllPairs {
    type Output = Vec<Pool>;

    fn name(&self) -> &'static str {
        "subgraph-all-pairs"
    }

    fn service(&self) -> &'static str {
        SERVICE
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.subgraph.supported_chains()
    }

    fn params(&self) -> Option<Vec<String>> {
        Some(Vec::new())
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .with_stale_time(Duration::from_secs(30))
            .with_enabled(self.enabled)
    }

    fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Vec<Pool>, QueryError>> {
        let subgraph = self.subgraph.clone();
        async move { subgraph.all_pairs(chain).await.map_err(query_error) }.boxed()
    }
}

/// A single pool. Resolves to `None` if the subgraph doesn't know the pool.
pub struct PoolById {
    pub(super) subgraph: Arc<dyn SubgraphService>,
    pub(super) pool: Option<Address>,
    pub(super) enabled: bool,
}

impl QuerySpec for PoolById {
    type Output = Option<Pool>;

    fn name(&self) -> &'static str {
        "pool-by-id"
    }

    fn service(&self) -> &'static str {
        SERVICE
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.subgraph.supported_chains()
    }

    fn params(&self) -> Option<Vec<String>> {
        self.pool.map(|pool| vec![address_param(pool)])
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .with_stale_time(Duration::from_secs(30))
            .with_enabled(self.enabled)
    }

    fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Option<Pool>, QueryError>> {
        let subgraph = self.subgraph.clone();
        let pool = self.pool;
        async move {
            let Some(pool) = pool else {
                return Ok(None);
            };
            subgraph.pool_by_id(chain, pool).await.map_err(query_error)
        }
        .boxed()
    }
}

/// The currencies a collection can be traded against.
pub struct CollectionCurrencies {
    pub(super) subgraph: Arc<dyn SubgraphService>,
    pub(super) collection: Option<Address>,
    pub(super) enabled: bool,
}

impl QuerySpec for CollectionCurrencies {
    type Output = Vec<Currency>;

    fn name(&self) -> &'static str {
        "collection-currencies"
    }

    fn service(&self) -> &'static str {
        SERVICE
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.subgraph.supported_chains()
    }

    fn params(&self) -> Option<Vec<String>> {
        self.collection
            .map(|collection| vec![address_param(collection)])
    }

    fn options(&self) -> QueryOptions {
        // Pairs for new currencies are rarely created.
        QueryOptions::default()
            .with_stale_time(Duration::from_secs(5 * 60))
            .with_enabled(self.enabled)
    }

    fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Vec<Currency>, QueryError>> {
        let subgraph = self.subgraph.clone();
        let collection = self.collection;
        async move {
            let Some(collection) = collection else {
                return Ok(Vec::new());
            };
            subgraph
                .collection_currencies(chain, collection)
                .await
                .map_err(query_error)
        }
        .boxed()
    }
}
