//! Pool data of the NFT AMM subgraph.

use {
    crate::client::{ContainsId, SubgraphClient},
    alloy_primitives::{Address, U256},
    anyhow::Context,
    chain::ChainId,
    itertools::Itertools,
    reqwest::{Client, Url},
    serde::{Deserialize, Serialize},
    serde_with::{DisplayFromStr, serde_as},
    std::collections::HashMap,
    thiserror::Error,
};

const PAIR_FIELDS: &str = r#"
    id
    collection {
        id
        name
        symbol
    }
    token {
        id
        name
        symbol
        decimals
    }
    reserveNft
    reserveToken
    totalSupply
    swapFeeBps
"#;

fn all_pairs_query() -> String {
    format!(
        r#"
        query Pairs($pageSize: Int, $lastId: ID) {{
            pairs(
                first: $pageSize
                orderBy: id
                where: {{ id_gt: $lastId }}
            ) {{
                {PAIR_FIELDS}
            }}
        }}
        "#
    )
}

fn pair_by_id_query() -> String {
    format!(
        r#"
        query Pair($id: ID!) {{
            pair(id: $id) {{
                {PAIR_FIELDS}
            }}
        }}
        "#
    )
}

const COLLECTION_CURRENCIES_QUERY: &str = r#"
    query CollectionCurrencies($collection: String, $pageSize: Int, $lastId: ID) {
        pairs(
            first: $pageSize
            orderBy: id
            where: { collection: $collection, id_gt: $lastId }
        ) {
            id
            token {
                id
                name
                symbol
                decimals
            }
        }
    }
"#;

/// A liquidity pool pairing a wrapped NFT collection with a fungible token.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: Address,
    pub collection: Collection,
    pub token: Currency,
    /// Number of NFTs held by the pool.
    #[serde_as(as = "DisplayFromStr")]
    pub reserve_nft: U256,
    /// Amount of the fungible token held by the pool, in atoms.
    #[serde_as(as = "DisplayFromStr")]
    pub reserve_token: U256,
    /// Supply of the pool's liquidity token.
    #[serde_as(as = "DisplayFromStr")]
    pub total_supply: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub swap_fee_bps: u32,
}

impl ContainsId for Pool {
    fn get_id(&self) -> String {
        self.id.to_string().to_lowercase()
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Collection {
    pub id: Address,
    pub name: String,
    pub symbol: String,
}

/// A fungible token an NFT collection is traded against.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Currency {
    #[serde(rename = "id")]
    pub address: Address,
    pub name: String,
    pub symbol: String,
    #[serde_as(as = "DisplayFromStr")]
    pub decimals: u8,
}

#[derive(Debug, Deserialize)]
struct CurrencyPair {
    id: Address,
    token: Currency,
}

impl ContainsId for CurrencyPair {
    fn get_id(&self) -> String {
        self.id.to_string().to_lowercase()
    }
}

#[derive(Debug, Deserialize)]
struct PairData {
    pair: Option<Pool>,
}

#[derive(Debug, Error)]
pub enum SubgraphError {
    #[error("no subgraph deployed on chain {chain}")]
    UnsupportedChain {
        chain: ChainId,
        supported: Vec<ChainId>,
    },

    #[error(transparent)]
    Query(#[from] anyhow::Error),
}

/// Queries against the subgraph of every supported chain.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait SubgraphService: Send + Sync {
    /// Chains with a configured subgraph, in ascending order.
    fn supported_chains(&self) -> Vec<ChainId>;

    /// All pairs known to the subgraph.
    async fn all_pairs(&self, chain: ChainId) -> Result<Vec<Pool>, SubgraphError>;

    /// The pair with the given address, `None` if the subgraph doesn't know it.
    async fn pool_by_id(
        &self,
        chain: ChainId,
        id: Address,
    ) -> Result<Option<Pool>, SubgraphError>;

    /// The distinct currencies the collection is paired with.
    async fn collection_currencies(
        &self,
        chain: ChainId,
        collection: Address,
    ) -> Result<Vec<Currency>, SubgraphError>;
}

/// Subgraph service backed by one subgraph deployment per chain.
pub struct DefaultSubgraphService {
    subgraphs: HashMap<ChainId, SubgraphClient>,
}

impl DefaultSubgraphService {
    pub fn new(
        endpoints: impl IntoIterator<Item = (ChainId, Url)>,
        client: Client,
    ) -> anyhow::Result<Self> {
        let subgraphs = endpoints
            .into_iter()
            .map(|(chain, url)| {
                let subgraph = SubgraphClient::new(url, client.clone())
                    .with_context(|| format!("subgraph url for chain {chain}"))?;
                Ok((chain, subgraph))
            })
            .collect::<anyhow::Result<HashMap<_, _>>>()?;
        Ok(Self { subgraphs })
    }

    fn subgraph(&self, chain: ChainId) -> Result<&SubgraphClient, SubgraphError> {
        self.subgraphs
            .get(&chain)
            .ok_or_else(|| SubgraphError::UnsupportedChain {
                chain,
                supported: self.supported_chains(),
            })
    }
}

#[async_trait::async_trait]
impl SubgraphService for DefaultSubgraphService {
    fn supported_chains(&self) -> Vec<ChainId> {
        self.subgraphs.keys().copied().sorted().collect()
    }

    async fn all_pairs(&self, chain: ChainId) -> Result<Vec<Pool>, SubgraphError> {
        let subgraph = self.subgraph(chain)?;
        let pairs: Vec<Pool> = subgraph
            .paginated_query(&all_pairs_query(), Default::default())
            .await
            .context("all pairs query")?;
        tracing::debug!(%chain, pairs = pairs.len(), "fetched pairs from subgraph");
        Ok(pairs)
    }

    async fn pool_by_id(
        &self,
        chain: ChainId,
        id: Address,
    ) -> Result<Option<Pool>, SubgraphError> {
        let subgraph = self.subgraph(chain)?;
        let data: PairData = subgraph
            .query(
                &pair_by_id_query(),
                Some(crate::json_map! {
                    "id" => id.to_string().to_lowercase(),
                }),
            )
            .await
            .context("pair by id query")?;
        Ok(data.pair)
    }

    async fn collection_currencies(
        &self,
        chain: ChainId,
        collection: Address,
    ) -> Result<Vec<Currency>, SubgraphError> {
        let subgraph = self.subgraph(chain)?;
        let pairs: Vec<CurrencyPair> = subgraph
            .paginated_query(
                COLLECTION_CURRENCIES_QUERY,
                crate::json_map! {
                    "collection" => collection.to_string().to_lowercase(),
                },
            )
            .await
            .context("collection currencies query")?;
        Ok(unique_currencies(pairs))
    }
}

fn unique_currencies(pairs: Vec<CurrencyPair>) -> Vec<Currency> {
    pairs
        .into_iter()
        .map(|pair| pair.token)
        .unique_by(|currency| currency.address)
        .collect()
}
