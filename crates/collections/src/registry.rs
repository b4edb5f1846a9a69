use {
    alloy_primitives::Address,
    anyhow::{Context, Result},
    chain::ChainId,
    reqwest::{Client, Url},
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

const BUILTIN_LIST: &str = include_str!("../data/hyperliquid-collections.json");

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    #[serde(rename = "logoURI")]
    pub logo: String,
}

/// Known NFT collections, scoped by chain.
///
/// Lookups compare parsed addresses so the casing of the source data does not
/// matter.
#[derive(Clone, Debug, Default)]
pub struct CollectionRegistry {
    collections: HashMap<ChainId, HashMap<Address, CollectionInfo>>,
}

impl CollectionRegistry {
    pub fn new(collections: impl IntoIterator<Item = (ChainId, CollectionInfo)>) -> Self {
        let mut registry = Self::default();
        for (chain, info) in collections {
            registry
                .collections
                .entry(chain)
                .or_default()
                .insert(info.address, info);
        }
        registry
    }

    /// The list shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Ok(Self::from_model(builtin_model()?, None))
    }

    fn from_model(model: CollectionListModel, chain: Option<ChainId>) -> Self {
        Self::new(
            model
                .collections
                .into_iter()
                .filter(|entry| chain.is_none_or(|chain| entry.chain_id == chain))
                .map(|entry| (entry.chain_id, entry.info)),
        )
    }

    pub fn get(&self, chain: ChainId, address: &Address) -> Option<&CollectionInfo> {
        self.collections.get(&chain)?.get(address)
    }

    /// All collections of the chain, in no particular order.
    pub fn chain(&self, chain: ChainId) -> impl Iterator<Item = &CollectionInfo> {
        self.collections.get(&chain).into_iter().flat_map(|c| c.values())
    }

    pub fn len(&self) -> usize {
        self.collections.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Source of the Hyperliquid collection registry.
#[derive(Clone, Debug)]
pub struct HyperliquidCollections {
    client: Client,
    url: Option<Url>,
}

impl HyperliquidCollections {
    /// Without a URL the builtin list is used.
    pub fn new(url: Option<Url>, client: Client) -> Self {
        Self { client, url }
    }

    /// Loads the collections of the chain. Falls back to the builtin list
    /// when the configured list can't be fetched or decoded.
    pub async fn load(&self, chain: ChainId) -> Result<CollectionRegistry> {
        let model = match &self.url {
            Some(url) => match self.fetch(url).await {
                Ok(model) => model,
                Err(err) => {
                    tracing::warn!(
                        %url,
                        ?err,
                        "failed to load collection list, using builtin list"
                    );
                    builtin_model()?
                }
            },
            None => {
                tracing::debug!(%chain, "using builtin collection list");
                builtin_model()?
            }
        };
        let registry = CollectionRegistry::from_model(model, Some(chain));
        tracing::debug!(%chain, collections = registry.len(), "loaded collection list");
        Ok(registry)
    }

    async fn fetch(&self, url: &Url) -> Result<CollectionListModel> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("collection list {url}"))
    }
}

fn builtin_model() -> Result<CollectionListModel> {
    serde_json::from_str(BUILTIN_LIST).context("builtin collection list")
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CollectionListModel {
    #[serde(default)]
    name: Option<String>,
    collections: Vec<CollectionModel>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CollectionModel {
    chain_id: ChainId,
    #[serde(flatten)]
    info: CollectionInfo,
}

#[cfg(test)]
mod tests {
    use {super::*, alloy_primitives::address, chain::Chain};

    const LIST: &str = r#"
    {
        "name": "Test collections",
        "collections": [
            {
                "chainId": 999,
                "address": "0xAbCdEf0000000000000000000000000000000001",
                "name": "Hypio",
                "symbol": "HYPIO",
                "logoURI": "https://logos.example/hypio.png"
            },
            {
                "chainId": 998,
                "address": "0xabcdef0000000000000000000000000000000002",
                "name": "Testnet",
                "symbol": "TEST",
                "logoURI": "https://logos.example/test.png"
            }
        ]
    }"#;

    #[test]
    fn keeps_only_requested_chain() {
        let model: CollectionListModel = serde_json::from_str(LIST).unwrap();
        assert_eq!(model.name.as_deref(), Some("Test collections"));

        let registry = CollectionRegistry::from_model(model, Some(Chain::HyperEvm.id()));
        assert_eq!(registry.len(), 1);
        assert!(
            registry
                .get(
                    Chain::HyperEvm.id(),
                    &address!("abcdef0000000000000000000000000000000001")
                )
                .is_some()
        );
        assert_eq!(registry.chain(Chain::HyperEvmTestnet.id()).count(), 0);
    }

    #[test]
    fn lookup_ignores_address_casing() {
        let model: CollectionListModel = serde_json::from_str(LIST).unwrap();
        let registry = CollectionRegistry::from_model(model, None);
        let lower: Address = "0xabcdef0000000000000000000000000000000001"
            .parse()
            .unwrap();
        let upper: Address = "0xABCDEF0000000000000000000000000000000001"
            .parse()
            .unwrap();
        assert_eq!(
            registry.get(ChainId(999), &lower),
            registry.get(ChainId(999), &upper)
        );
        assert_eq!(registry.get(ChainId(999), &lower).unwrap().symbol, "HYPIO");
        assert!(registry.get(ChainId(1), &lower).is_none());
    }

    #[test]
    fn builtin_list_parses() {
        let registry = CollectionRegistry::builtin().unwrap();
        assert!(!registry.is_empty());
        assert!(registry.chain(Chain::HyperEvm.id()).count() > 0);
    }

    #[tokio::test]
    async fn uses_builtin_list_without_url() {
        let collections = HyperliquidCollections::new(None, Client::new());
        let registry = collections.load(Chain::HyperEvm.id()).await.unwrap();
        assert!(!registry.is_empty());
        assert_eq!(registry.chain(Chain::HyperEvmTestnet.id()).count(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_builtin_list_when_fetch_fails() {
        let collections = HyperliquidCollections::new(
            Some("http://127.0.0.1:1/list.json".parse().unwrap()),
            Client::new(),
        );
        let registry = collections.load(Chain::HyperEvm.id()).await.unwrap();
        let builtin = CollectionRegistry::builtin().unwrap();
        assert_eq!(
            registry.chain(Chain::HyperEvm.id()).count(),
            builtin.chain(Chain::HyperEvm.id()).count()
        );
        assert_eq!(registry.chain(Chain::HyperEvmTestnet.id()).count(), 0);
    }
}
