//! A module implementing a client for querying subgraphs.

use {
    anyhow::{Result, bail},
    reqwest::{Client, IntoUrl, Url},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::{Map, Value},
    thiserror::Error,
};

/// Number of entities requested per page when paginating.
pub const QUERY_PAGE_SIZE: usize = 1000;

#[macro_export]
macro_rules! json_map {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = ::serde_json::Map::<String, ::serde_json::Value>::new();
        $(
            map.insert(($key).into(), ($value).into());
        )*
        map
    }}
}

/// A general client for querying subgraphs.
#[derive(Clone, Debug)]
pub struct SubgraphClient {
    client: Client,
    subgraph_url: Url,
}

/// Entities that can be paginated by their `id`.
pub trait ContainsId {
    fn get_id(&self) -> String;
}

/// Response wrapper for queries that return a single list of entities,
/// regardless of the name of the list.
#[derive(Debug, Deserialize)]
pub struct Data<T> {
    #[serde(alias = "pairs", alias = "tokens")]
    pub inner: Vec<T>,
}

impl SubgraphClient {
    /// Creates a new subgraph client for the full subgraph URL.
    pub fn new(subgraph_url: impl IntoUrl, client: Client) -> Result<Self> {
        Ok(Self {
            client,
            subgraph_url: subgraph_url.into_url()?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.subgraph_url
    }

    /// Performs the specified GraphQL query on the current subgraph.
    pub async fn query<T>(&self, query: &str, variables: Option<Map<String, Value>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        tracing::trace!(url = %self.subgraph_url, "querying subgraph");
        self.client
            .post(self.subgraph_url.clone())
            .json(&Query { query, variables })
            .send()
            .await?
            .error_for_status()?
            .json::<QueryResponse<T>>()
            .await?
            .into_result()
    }

    /// Performs the query repeatedly, each time requesting the page of
    /// entities following the last id of the previous page, until a page is
    /// not full.
    ///
    /// The query needs to take `$pageSize` and `$lastId` variables and order
    /// the entities by id.
    pub async fn paginated_query<T>(
        &self,
        query: &str,
        mut variables: Map<String, Value>,
    ) -> Result<Vec<T>>
    where
        T: ContainsId + DeserializeOwned,
    {
        let mut result = Vec::new();
        variables.insert("pageSize".to_string(), QUERY_PAGE_SIZE.into());
        variables.insert("lastId".to_string(), "".into());
        loop {
            let page = self
                .query::<Data<T>>(query, Some(variables.clone()))
                .await?
                .inner;
            let no_more_pages = page.len() != QUERY_PAGE_SIZE;
            if let Some(last) = page.last() {
                variables.insert("lastId".to_string(), last.get_id().into());
            }
            result.extend(page);
            if no_more_pages {
                break;
            }
        }
        Ok(result)
    }
}

/// A GraphQL query.
#[derive(Serialize)]
struct Query<'a> {
    query: &'a str,
    variables: Option<Map<String, Value>>,
}

/// A GraphQL query response.
///
/// This type gets converted into a Rust `Result` type, while handling invalid
/// responses (with missing data and errors).
#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    #[serde(default = "empty_data")]
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<QueryError>>,
}

impl<T> QueryResponse<T> {
    fn into_result(self) -> Result<T> {
        match self {
            Self {
                data: Some(data),
                errors: None,
            } => Ok(data),
            Self {
                errors: Some(errors),
                data: None,
            } if !errors.is_empty() => {
                // Make sure to log additional errors if there are more than
                // one, and just bubble up the first error.
                for error in &errors[1..] {
                    tracing::warn!("additional GraphQL error: {}", error.message);
                }
                bail!("{}", errors[0])
            }
            _ => bail!("invalid GraphQL response"),
        }
    }
}

#[derive(Debug, Deserialize, Error)]
#[error("{}", .message)]
struct QueryError {
    message: String,
}

/// Function to work around the fact that `#[serde(default)]` on an `Option<T>`
/// requires `T: Default`.
fn empty_data<T>() -> Option<T> {
    None
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        serde_json::{Value, json},
    };

    #[test]
    fn serialize_query() {
        assert_eq!(
            serde_json::to_value(&Query {
                query: "pairs { id }",
                variables: Some(json_map! {
                    "collection" => "0xabc",
                    "pageSize" => 1000,
                    "lastId" => "",
                }),
            })
            .unwrap(),
            json!({
                "query": "pairs { id }",
                "variables": {
                    "collection": "0xabc",
                    "pageSize": 1000,
                    "lastId": "",
                },
            }),
        );
    }

    fn response_from_json<T>(value: Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_value::<QueryResponse<T>>(value)
            .unwrap()
            .into_result()
    }

    #[test]
    fn deserialize_successful_response() {
        assert!(response_from_json::<bool>(json!({ "data": true })).unwrap());
    }

    #[test]
    fn deserialize_error_response() {
        assert_eq!(
            response_from_json::<bool>(json!({
                "data": null,
                "errors": [{"message": "indexing error"}],
            }))
            .unwrap_err()
            .to_string(),
            "indexing error",
        );
    }

    #[test]
    fn deserialize_multi_error_response_keeps_first() {
        assert_eq!(
            response_from_json::<bool>(json!({
                "errors": [
                    {"message": "first"},
                    {"message": "second"},
                ],
            }))
            .unwrap_err()
            .to_string(),
            "first",
        );
    }

    #[test]
    fn deserialize_invalid_response() {
        assert!(response_from_json::<bool>(json!({ "data": null, "errors": null })).is_err());
        assert!(response_from_json::<bool>(json!({ "data": null, "errors": [] })).is_err());
        assert!(
            response_from_json::<bool>(json!({
                "data": true,
                "errors": [{"message": "bad"}],
            }))
            .is_err()
        );
    }

    #[test]
    fn data_accepts_entity_list_names() {
        let pairs: Data<u32> = serde_json::from_value(json!({ "pairs": [1, 2] })).unwrap();
        assert_eq!(pairs.inner, vec![1, 2]);
        let tokens: Data<u32> = serde_json::from_value(json!({ "tokens": [] })).unwrap();
        assert!(tokens.inner.is_empty());
    }
}
