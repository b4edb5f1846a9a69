//! Chain-scoped data hooks.
//!
//! Every hook returns a [`ChainScopedQuery`] bound to the process-wide query
//! cache and chain selection. Handles are cheap to create: all handles for
//! the same parameters share cache entries and in-flight requests.

mod nfts;
mod pools;

pub use {
    nfts::{PoolNfts, UserNfts},
    pools::{AllPairs, CollectionCurrencies, PoolById},
};
use {
    alloy_primitives::{Address, U256},
    chain::ChainContext,
    query::{ChainScopedQuery, QueryClient},
    reservoir::ReservoirApi,
    std::sync::Arc,
    subgraph::SubgraphService,
};

#[derive(Clone)]
pub struct Hooks {
    client: QueryClient,
    chain: ChainContext,
    subgraph: Arc<dyn SubgraphService>,
    reservoir: Arc<dyn ReservoirApi>,
    enabled: bool,
}

impl Hooks {
    pub fn new(
        client: QueryClient,
        chain: ChainContext,
        subgraph: Arc<dyn SubgraphService>,
        reservoir: Arc<dyn ReservoirApi>,
    ) -> Self {
        Self {
            client,
            chain,
            subgraph,
            reservoir,
            enabled: true,
        }
    }

    /// Hooks whose queries only run while `enabled` is set. Disabled queries
    /// stay idle and never reach the services.
    pub fn enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }

    pub fn chain(&self) -> &ChainContext {
        &self.chain
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }

    pub fn subgraph_all_pairs(&self) -> ChainScopedQuery<AllPairs> {
        self.bind(AllPairs {
            subgraph: self.subgraph.clone(),
            enabled: self.enabled,
        })
    }

    pub fn pool_by_id(&self, pool: Option<Address>) -> ChainScopedQuery<PoolById> {
        self.bind(PoolById {
            subgraph: self.subgraph.clone(),
            pool,
            enabled: self.enabled,
        })
    }

    pub fn collection_currencies(
        &self,
        collection: Option<Address>,
    ) -> ChainScopedQuery<CollectionCurrencies> {
        self.bind(CollectionCurrencies {
            subgraph: self.subgraph.clone(),
            collection,
            enabled: self.enabled,
        })
    }

    /// Idle until both a collection and at least one token id are given.
    pub fn pool_nfts(
        &self,
        collection: Option<Address>,
        token_ids: impl IntoIterator<Item = U256>,
    ) -> ChainScopedQuery<PoolNfts> {
        self.bind(PoolNfts::new(
            self.reservoir.clone(),
            collection,
            token_ids,
            self.enabled,
        ))
    }

    pub fn user_nfts(
        &self,
        owner: Option<Address>,
        collection: Option<Address>,
    ) -> ChainScopedQuery<UserNfts> {
        self.bind(UserNfts {
            reservoir: self.reservoir.clone(),
            owner,
            collection,
            enabled: self.enabled,
        })
    }

    fn bind<Q: query::QuerySpec>(&self, spec: Q) -> ChainScopedQuery<Q> {
        ChainScopedQuery::new(spec, self.client.clone(), self.chain.clone())
    }
}

/// Addresses are part of cache keys in one canonical casing.
fn address_param(address: Address) -> String {
    address.to_string().to_lowercase()
}
