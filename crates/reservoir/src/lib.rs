//! Client for the Reservoir NFT metadata API.
//!
//! See <https://docs.reservoir.tools/reference/overview>.

use {
    alloy_primitives::{Address, U256},
    anyhow::{Context, Result},
    chain::{Chain, ChainId},
    reqwest::{Client, IntoUrl, Url},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_with::{DisplayFromStr, serde_as},
    std::collections::HashMap,
    thiserror::Error,
};

/// Maximum number of `tokens` filters Reservoir accepts per request.
pub const TOKENS_PER_REQUEST: usize = 50;

/// Page size of the user tokens endpoint.
pub const USER_TOKENS_PAGE_SIZE: usize = 200;

/// A token of a collection with its metadata.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionToken {
    pub contract: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub token_id: U256,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub owner: Option<Address>,
    #[serde(default)]
    pub collection: Option<CollectionRef>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CollectionRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A token held by a user.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNft {
    pub token: CollectionToken,
    /// Amount held, larger than one for semi-fungible tokens.
    #[serde_as(as = "DisplayFromStr")]
    pub token_count: U256,
    #[serde(default)]
    pub acquired_at: Option<String>,
}

/// Abstract Reservoir API. Provides a mockable implementation.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait ReservoirApi: Send + Sync {
    /// Chains Reservoir indexes, in ascending order.
    fn supported_chains(&self) -> Vec<ChainId>;

    /// Metadata of the given tokens of a collection. Tokens Reservoir doesn't
    /// know are missing from the result.
    ///
    /// See [`/tokens/v7`](https://docs.reservoir.tools/reference/gettokensv7).
    async fn collection_tokens(
        &self,
        chain: ChainId,
        collection: Address,
        token_ids: Vec<U256>,
    ) -> Result<Vec<CollectionToken>, ReservoirError>;

    /// All tokens of a collection held by the owner.
    ///
    /// See [`/users/{user}/tokens/v10`](https://docs.reservoir.tools/reference/getusersusertokensv10).
    async fn user_tokens(
        &self,
        chain: ChainId,
        owner: Address,
        collection: Address,
    ) -> Result<Vec<UserNft>, ReservoirError>;
}

#[derive(Debug, Error)]
pub enum ReservoirError {
    #[error("reservoir does not index chain {chain}")]
    UnsupportedChain {
        chain: ChainId,
        supported: Vec<ChainId>,
    },

    #[error("reservoir responded with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Error({0}) for response {1}")]
    Deserialize(serde_json::Error, String),

    // Recovered response but failed on async call of response.text()
    #[error(transparent)]
    TextFetch(reqwest::Error),

    // Connectivity or non-response error
    #[error("failed on send")]
    Send(#[source] reqwest::Error),
}

/// Reservoir API client implementation.
#[derive(Debug)]
pub struct DefaultReservoirApi {
    client: Client,
    base_urls: HashMap<ChainId, Url>,
    api_key: Option<String>,
}

impl DefaultReservoirApi {
    /// Creates a client for the public Reservoir deployments.
    pub fn new(api_key: Option<String>, client: Client) -> Self {
        let base_urls = [
            (Chain::Ethereum, "https://api.reservoir.tools/"),
            (Chain::Sepolia, "https://api-sepolia.reservoir.tools/"),
            (Chain::Base, "https://api-base.reservoir.tools/"),
            (Chain::ArbitrumOne, "https://api-arbitrum.reservoir.tools/"),
            (Chain::ApeChain, "https://api-apechain.reservoir.tools/"),
        ]
        .into_iter()
        .map(|(chain, url)| (chain.id(), url.parse().unwrap()))
        .collect();
        Self {
            client,
            base_urls,
            api_key,
        }
    }

    /// Overrides the API base URL of a chain, adding support for it if needed.
    pub fn with_base_url(mut self, chain: ChainId, url: impl IntoUrl) -> Result<Self> {
        let mut url = url.into_url().context("reservoir base url")?;
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        self.base_urls.insert(chain, url);
        Ok(self)
    }

    fn base_url(&self, chain: ChainId) -> Result<&Url, ReservoirError> {
        self.base_urls
            .get(&chain)
            .ok_or_else(|| ReservoirError::UnsupportedChain {
                chain,
                supported: self.supported_chains(),
            })
    }

    async fn request<T: DeserializeOwned>(&self, url: Url) -> Result<T, ReservoirError> {
        tracing::debug!(%url, "querying reservoir");

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        let response = request.send().await.map_err(ReservoirError::Send)?;
        let status = response.status();
        let text = response.text().await.map_err(ReservoirError::TextFetch)?;
        tracing::trace!(%status, %text, "response from reservoir");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|err| err.message)
                .unwrap_or(text);
            return Err(ReservoirError::Api {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(&text).map_err(|err| ReservoirError::Deserialize(err, text))
    }
}

#[async_trait::async_trait]
impl ReservoirApi for DefaultReservoirApi {
    fn supported_chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<_> = self.base_urls.keys().copied().collect();
        chains.sort();
        chains
    }

    async fn collection_tokens(
        &self,
        chain: ChainId,
        collection: Address,
        token_ids: Vec<U256>,
    ) -> Result<Vec<CollectionToken>, ReservoirError> {
        let base_url = self.base_url(chain)?;
        let mut tokens = Vec::with_capacity(token_ids.len());
        for batch in token_ids.chunks(TOKENS_PER_REQUEST) {
            let mut continuation = None;
            loop {
                let url = tokens_url(base_url, collection, batch, continuation.as_deref());
                let page: Page<TokenEntry> = self.request(url).await?;
                tokens.extend(page.tokens.into_iter().map(|entry| entry.token));
                continuation = match page.continuation {
                    Some(next) => Some(next),
                    None => break,
                };
            }
        }
        Ok(tokens)
    }

    async fn user_tokens(
        &self,
        chain: ChainId,
        owner: Address,
        collection: Address,
    ) -> Result<Vec<UserNft>, ReservoirError> {
        let base_url = self.base_url(chain)?;
        let mut tokens = Vec::new();
        let mut continuation = None;
        loop {
            let url = user_tokens_url(base_url, owner, collection, continuation.as_deref());
            let page: Page<UserTokenEntry> = self.request(url).await?;
            if !expect_more_results_after_handling_response(&mut tokens, page, &mut continuation)
            {
                break;
            }
        }
        tracing::debug!(%chain, %owner, %collection, tokens = tokens.len(), "fetched user tokens");
        Ok(tokens)
    }
}

fn tokens_url(
    base_url: &Url,
    collection: Address,
    token_ids: &[U256],
    continuation: Option<&str>,
) -> Url {
    // unwrap because the path is static and the base url is a valid base.
    let mut url = base_url.join("tokens/v7").unwrap();
    {
        let mut query = url.query_pairs_mut();
        for token_id in token_ids {
            query.append_pair("tokens", &format!("{}:{token_id}", lowercase(collection)));
        }
        query.append_pair("limit", &TOKENS_PER_REQUEST.to_string());
        if let Some(continuation) = continuation {
            query.append_pair("continuation", continuation);
        }
    }
    url
}

fn user_tokens_url(
    base_url: &Url,
    owner: Address,
    collection: Address,
    continuation: Option<&str>,
) -> Url {
    let mut url = base_url
        .join(&format!("users/{}/tokens/v10", lowercase(owner)))
        .unwrap();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("collection", &lowercase(collection))
            .append_pair("limit", &USER_TOKENS_PAGE_SIZE.to_string());
        if let Some(continuation) = continuation {
            query.append_pair("continuation", continuation);
        }
    }
    url
}

fn lowercase(address: Address) -> String {
    address.to_string().to_lowercase()
}

/// Append the tokens of the page to the results and return whether another
/// page should be fetched.
fn expect_more_results_after_handling_response(
    results: &mut Vec<UserNft>,
    page: Page<UserTokenEntry>,
    continuation: &mut Option<String>,
) -> bool {
    results.extend(page.tokens.into_iter().map(UserNft::from));
    *continuation = page.continuation;
    continuation.is_some()
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    tokens: Vec<T>,
    #[serde(default)]
    continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    token: CollectionToken,
}

#[derive(Debug, Deserialize)]
struct UserTokenEntry {
    token: CollectionToken,
    ownership: Ownership,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ownership {
    #[serde_as(as = "DisplayFromStr")]
    token_count: U256,
    #[serde(default)]
    acquired_at: Option<String>,
}

impl From<UserTokenEntry> for UserNft {
    fn from(entry: UserTokenEntry) -> Self {
        Self {
            token: entry.token,
            token_count: entry.ownership.token_count,
            acquired_at: entry.ownership.acquired_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}
