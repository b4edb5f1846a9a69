//! Queries against the Reservoir NFT metadata API.

use {
    super::address_param,
    alloy_primitives::{Address, U256},
    chain::ChainId,
    futures::{FutureExt, future::BoxFuture},
    query::{QueryError, QueryOptions, QuerySpec},
    reservoir::{CollectionToken, ReservoirApi, ReservoirError, UserNft},
    std::{sync::Arc, time::Duration},
};

const SERVICE: &str = "reservoir";

fn query_error(err: ReservoirError) -> QueryError {
    match err {
        ReservoirError::UnsupportedChain { chain, supported } => QueryError::UnsupportedChain {
            service: SERVICE,
            chain,
            supported,
        },
        err => QueryError::service(err),
    }
}

/// Metadata of the NFTs a pool holds.
pub struct PoolNfts {
    pub(super) reservoir: Arc<dyn ReservoirApi>,
    pub(super) collection: Option<Address>,
    /// Sorted and without duplicates so the order the ids were passed in
    /// doesn't split the cache.
    pub(super) token_ids: Vec<U256>,
    pub(super) enabled: bool,
}

impl PoolNfts {
    pub(super) fn new(
        reservoir: Arc<dyn ReservoirApi>,
        collection: Option<Address>,
        token_ids: impl IntoIterator<Item = U256>,
        enabled: bool,
    ) -> Self {
        let mut token_ids: Vec<_> = token_ids.into_iter().collect();
        token_ids.sort_unstable();
        token_ids.dedup();
        Self {
            reservoir,
            collection,
            token_ids,
            enabled,
        }
    }
}

impl QuerySpec for PoolNfts {
    type Output = Vec<CollectionToken>;

    fn name(&self) -> &'static str {
        "pool-nfts"
    }

    fn service(&self) -> &'static str {
        SERVICE
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.reservoir.supported_chains()
    }

    fn params(&self) -> Option<Vec<String>> {
        let collection = self.collection?;
        if self.token_ids.is_empty() {
            return None;
        }
        let token_ids = self
            .token_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Some(vec![address_param(collection), token_ids])
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .with_stale_time(Duration::from_secs(60))
            .with_enabled(self.enabled)
    }

    fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Vec<CollectionToken>, QueryError>> {
        let reservoir = self.reservoir.clone();
        let collection = self.collection;
        let token_ids = self.token_ids.clone();
        async move {
            let Some(collection) = collection else {
                return Ok(Vec::new());
            };
            reservoir
                .collection_tokens(chain, collection, token_ids)
                .await
                .map_err(query_error)
        }
        .boxed()
    }
}

/// The NFTs of a collection the owner holds.
pub struct UserNfts {
    pub(super) reservoir: Arc<dyn ReservoirApi>,
    pub(super) owner: Option<Address>,
    pub(super) collection: Option<Address>,
    pub(super) enabled: bool,
}

impl QuerySpec for UserNfts {
    type Output = Vec<UserNft>;

    fn name(&self) -> &'static str {
        "user-nfts"
    }

    fn service(&self) -> &'static str {
        SERVICE
    }

    fn supported_chains(&self) -> Vec<ChainId> {
        self.reservoir.supported_chains()
    }

    fn params(&self) -> Option<Vec<String>> {
        Some(vec![
            address_param(self.owner?),
            address_param(self.collection?),
        ])
    }

    fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .with_stale_time(Duration::from_secs(30))
            .with_enabled(self.enabled)
    }

    fn fetch(&self, chain: ChainId) -> BoxFuture<'static, Result<Vec<UserNft>, QueryError>> {
        let reservoir = self.reservoir.clone();
        let (owner, collection) = (self.owner, self.collection);
        async move {
            let (Some(owner), Some(collection)) = (owner, collection) else {
                return Ok(Vec::new());
            };
            reservoir
                .user_tokens(chain, owner, collection)
                .await
                .map_err(query_error)
        }
        .boxed()
    }
}
